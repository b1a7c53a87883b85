//! Transcript events produced by the speech backend

use serde::{Deserialize, Serialize};

/// A recognized utterance
///
/// Only finalized events with non-empty text trigger downstream work.
/// Interim events are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TranscriptEvent {
    /// Recognized text
    pub text: String,
    /// Result is complete (not interim/partial)
    pub is_final: bool,
    /// Backend confidence (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f32,
    /// Offset of the utterance from stream start (ms)
    #[serde(default)]
    pub start_ms: u64,
    /// Utterance duration (ms)
    #[serde(default)]
    pub duration_ms: u64,
    /// Backend-specific extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TranscriptEvent {
    /// Finalized transcript
    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            ..Default::default()
        }
    }

    /// Interim transcript
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            ..Default::default()
        }
    }

    /// Whether this event should be sent to the knowledge query
    pub fn is_actionable(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable() {
        assert!(TranscriptEvent::finalized("hello").is_actionable());
        assert!(!TranscriptEvent::finalized("   \t\n").is_actionable());
        assert!(!TranscriptEvent::finalized("").is_actionable());
        assert!(!TranscriptEvent::interim("hello").is_actionable());
    }
}
