//! Core traits and types for the call bridge
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frame types and encodings
//! - Transcript events from the speech backend
//! - Call lifecycle state and the pending-response slot
//! - Media stream wire events (`connected`, `start`, `media`, `stop`)
//! - Call scripts injected back into a live call
//! - Collaborator traits (speech recognizer, knowledge query, call control)
//! - Error types

pub mod audio;
pub mod call;
pub mod conversation;
pub mod error;
pub mod media_stream;
pub mod script;
pub mod traits;
pub mod transcript;

pub use audio::{silence_frame, AudioEncoding, MediaFrame};
pub use call::{CallState, PendingResponse, PendingSlot};
pub use conversation::{ConversationTurn, KnowledgeAnswer, KnowledgeRequest, TurnRole};
pub use error::{Error, Result};
pub use media_stream::{MediaFormat, MediaPayload, MediaStreamEvent, StreamStart, StreamStop};
pub use script::{CallInstruction, CallScript};
pub use transcript::TranscriptEvent;

pub use traits::{
    // Call control
    CallControl,
    // Knowledge
    KnowledgeQuery,
    // Speech
    LiveOptions,
    RecognizerEvent,
    RecognizerStream,
    SpeechRecognizer,
};
