//! Call lifecycle types

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Lifecycle state of one call session
///
/// ```text
/// Idle ──▶ Active ──▶ Draining ──▶ Closed
///   └──────────────────────────────▲
///        (speech backend failed to open)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Websocket open, nothing started
    #[default]
    Idle,
    /// Transcription streaming, pacer running
    Active,
    /// Stop requested, buffered audio being flushed
    Draining,
    /// All resources released
    Closed,
}

impl CallState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: CallState) -> bool {
        matches!(
            (self, next),
            (CallState::Idle, CallState::Active)
                | (CallState::Idle, CallState::Closed)
                | (CallState::Active, CallState::Draining)
                | (CallState::Draining, CallState::Closed)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Active => "active",
            CallState::Draining => "draining",
            CallState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An answer waiting to be spoken into the call
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResponse {
    /// Transcript that produced the answer
    pub query: String,
    /// Answer text to speak
    pub answer: String,
    /// When the answer was captured
    pub created_at: Instant,
}

impl PendingResponse {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            created_at: Instant::now(),
        }
    }
}

/// Single-entry slot for the next answer to deliver
///
/// Latest answer wins: `put` replaces an undelivered answer and hands the
/// replaced one back to the caller. Delivery uses `take`, so an answer is
/// either delivered or superseded, never both. `restore` returns a failed
/// delivery to the slot unless a newer answer already took its place.
///
/// The slot holds no lock of its own; the owning call session guards it.
#[derive(Debug, Default)]
pub struct PendingSlot {
    current: Option<PendingResponse>,
    superseded: u64,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an answer, returning the undelivered answer it replaced
    pub fn put(&mut self, response: PendingResponse) -> Option<PendingResponse> {
        let previous = self.current.replace(response);
        if previous.is_some() {
            self.superseded += 1;
        }
        previous
    }

    /// Take the answer for delivery, leaving the slot empty
    pub fn take(&mut self) -> Option<PendingResponse> {
        self.current.take()
    }

    /// Put back an answer whose delivery failed
    ///
    /// Returns `false` (and drops `response`) when a newer answer is waiting.
    pub fn restore(&mut self, response: PendingResponse) -> bool {
        if self.current.is_some() {
            return false;
        }
        self.current = Some(response);
        true
    }

    pub fn peek(&self) -> Option<&PendingResponse> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Number of undelivered answers replaced by newer ones
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(CallState::Idle.can_transition_to(CallState::Active));
        assert!(CallState::Idle.can_transition_to(CallState::Closed));
        assert!(CallState::Active.can_transition_to(CallState::Draining));
        assert!(CallState::Draining.can_transition_to(CallState::Closed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!CallState::Active.can_transition_to(CallState::Idle));
        assert!(!CallState::Active.can_transition_to(CallState::Closed));
        assert!(!CallState::Closed.can_transition_to(CallState::Active));
        assert!(!CallState::Draining.can_transition_to(CallState::Active));
        assert!(!CallState::Closed.can_transition_to(CallState::Closed));
    }

    #[test]
    fn test_slot_overwrites_undelivered_answer() {
        let mut slot = PendingSlot::new();
        assert!(slot.put(PendingResponse::new("q1", "first")).is_none());

        let replaced = slot.put(PendingResponse::new("q2", "second"));
        assert_eq!(replaced.map(|r| r.answer), Some("first".to_string()));
        assert_eq!(slot.peek().map(|r| r.answer.as_str()), Some("second"));
        assert_eq!(slot.superseded(), 1);

        assert_eq!(slot.take().map(|r| r.answer), Some("second".to_string()));
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_restore_yields_to_newer_answer() {
        let mut slot = PendingSlot::new();
        slot.put(PendingResponse::new("q1", "first"));
        let in_flight = slot.take().unwrap();

        // A newer answer lands while the first is being injected
        slot.put(PendingResponse::new("q2", "second"));
        assert!(!slot.restore(in_flight));
        assert_eq!(slot.peek().map(|r| r.answer.as_str()), Some("second"));

        let in_flight = slot.take().unwrap();
        assert!(slot.restore(in_flight));
        assert!(!slot.is_empty());
    }
}
