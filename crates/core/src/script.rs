//! Call scripts injected into a live call
//!
//! A script is an ordered list of instructions. Telephony adapters render it
//! into their own markup; the core only describes what the caller hears.

use serde::{Deserialize, Serialize};

/// One step of a call script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallInstruction {
    /// Silence for the given number of seconds
    Pause { seconds: u32 },
    /// Speak text with the provider's speech synthesis
    Say { text: String },
    /// Reconnect the call audio to a media stream websocket
    ConnectStream { url: String },
}

/// Ordered call instructions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallScript {
    pub instructions: Vec<CallInstruction>,
}

impl CallScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.instructions.push(CallInstruction::Pause { seconds });
        self
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.instructions.push(CallInstruction::Say { text: text.into() });
        self
    }

    pub fn connect_stream(mut self, url: impl Into<String>) -> Self {
        self.instructions
            .push(CallInstruction::ConnectStream { url: url.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Spoken text in order, ignoring pauses and stream reconnects
    pub fn spoken_text(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                CallInstruction::Say { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the script reconnects the media stream at the end
    pub fn reconnects_stream(&self) -> bool {
        matches!(
            self.instructions.last(),
            Some(CallInstruction::ConnectStream { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let script = CallScript::new()
            .pause(1)
            .say("one")
            .say("two")
            .connect_stream("wss://example.test/realtime");

        assert_eq!(script.len(), 4);
        assert_eq!(script.instructions[0], CallInstruction::Pause { seconds: 1 });
        assert_eq!(script.spoken_text(), vec!["one", "two"]);
        assert!(script.reconnects_stream());
    }

    #[test]
    fn test_empty_script() {
        let script = CallScript::new();
        assert!(script.is_empty());
        assert!(!script.reconnects_stream());
    }
}
