//! Call orchestration
//!
//! - [`CallSession`]: one call's lifecycle (Idle → Active → Draining → Closed),
//!   owning the media frame queue, pacer and transcription session
//! - [`TranscriptReactor`]: finalized transcript → knowledge query → answer
//! - [`ConversationStore`]: history per call SID, shared across media streams
//! - Call scripts spoken back into the call

pub mod call_session;
pub mod conversations;
pub mod reaction;
pub mod scripts;

pub use call_session::{
    CallEvent, CallSession, CallSessionConfig, CallSnapshot, CallSummary, Collaborators,
    CloseReason, DropCause, TransportMessage,
};
pub use conversations::ConversationStore;
pub use reaction::{Reaction, TranscriptReactor};
pub use scripts::{answer_script, greeting_script, keep_alive_script};

use call_bridge_core::CallState;
use call_bridge_pipeline::PipelineError;
use thiserror::Error;

/// Receive failure reported by the call transport
#[derive(Error, Debug, Clone)]
#[error("Transport receive error: {0}")]
pub struct TransportError(pub String);

/// Call session errors
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Transcription session failed to open: {0}")]
    Open(#[source] PipelineError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("Call session already running")]
    AlreadyRunning,
}

impl From<CallError> for call_bridge_core::Error {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Open(e) => e.into(),
            CallError::InvalidTransition { from, to } => {
                call_bridge_core::Error::InvalidTransition { from, to }
            }
            CallError::AlreadyRunning => call_bridge_core::Error::InvalidTransition {
                from: CallState::Idle,
                to: CallState::Active,
            },
        }
    }
}
