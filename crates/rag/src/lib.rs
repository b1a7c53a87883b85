//! Knowledge query client
//!
//! Sends a finalized transcript, the tenant identity and the call's
//! conversation history to the retrieval-augmented answer service and
//! returns its answer text.

pub mod client;

pub use client::{HttpKnowledgeClient, KnowledgeClientConfig};

use thiserror::Error;

/// Knowledge query errors
///
/// All of them are recoverable for the call: the answer is withheld and the
/// call keeps going.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Knowledge request failed: {0}")]
    Request(String),

    #[error("Knowledge service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse knowledge response: {0}")]
    Decode(String),

    #[error("Knowledge response carried no answer")]
    MissingAnswer,

    #[error("Knowledge client misconfigured: {0}")]
    Config(String),
}

impl From<RagError> for call_bridge_core::Error {
    fn from(err: RagError) -> Self {
        call_bridge_core::Error::Query(err.to_string())
    }
}
