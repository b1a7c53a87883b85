//! Error types shared across the call bridge crates

use thiserror::Error;

use crate::call::CallState;

/// Core error type
///
/// Variants follow the call error taxonomy: transport errors, speech backend
/// errors, knowledge query errors and call-control errors. Only backend
/// errors are fatal to a call.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Speech backend error: {0}")]
    Backend(String),

    #[error("Knowledge query error: {0}")]
    Query(String),

    #[error("Call control error: {0}")]
    CallControl(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Whether this error must tear the call down
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Backend(_) | Error::ChannelClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
