//! Real-time audio path for the call bridge
//!
//! This crate moves call audio from the websocket receive loop to the
//! streaming speech backend:
//! - Bounded media frame queue (single producer, single consumer)
//! - Pacer keeping a steady outbound cadence with silence filler
//! - Transcription session lifecycle over a [`SpeechRecognizer`]
//! - Deepgram live websocket backend
//!
//! [`SpeechRecognizer`]: call_bridge_core::SpeechRecognizer

pub mod pacer;
pub mod queue;
pub mod stt;

pub use pacer::{AudioSink, Pacer, PacerOutcome};
pub use queue::{media_queue, Dequeued, EnqueueError, Enqueued, FrameConsumer, FrameProducer, QueueStats};
pub use stt::{DeepgramConfig, DeepgramRecognizer, TranscriptionSession, TranscriptionState};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Speech backend connect failed: {0}")]
    Connect(String),

    #[error("Speech backend error: {0}")]
    Backend(String),

    #[error("Transcription session not streaming (state: {0})")]
    NotStreaming(TranscriptionState),

    #[error("Transcription session already opened (state: {0})")]
    AlreadyOpened(TranscriptionState),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl PipelineError {
    /// Whether the speech backend is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Connect(_)
                | PipelineError::Backend(_)
                | PipelineError::ChannelClosed
                | PipelineError::Timeout(_)
        )
    }
}

impl From<PipelineError> for call_bridge_core::Error {
    fn from(err: PipelineError) -> Self {
        use call_bridge_core::Error as CoreError;

        match err {
            PipelineError::Connect(msg) | PipelineError::Backend(msg) => CoreError::Backend(msg),
            PipelineError::ChannelClosed => CoreError::ChannelClosed,
            PipelineError::Timeout(ms) => CoreError::Timeout(ms),
            other @ (PipelineError::NotStreaming(_) | PipelineError::AlreadyOpened(_)) => {
                CoreError::Backend(other.to_string())
            }
        }
    }
}

impl From<call_bridge_core::Error> for PipelineError {
    fn from(err: call_bridge_core::Error) -> Self {
        use call_bridge_core::Error as CoreError;

        match err {
            CoreError::ChannelClosed => PipelineError::ChannelClosed,
            CoreError::Timeout(ms) => PipelineError::Timeout(ms),
            CoreError::Backend(msg) => PipelineError::Backend(msg),
            other => PipelineError::Backend(other.to_string()),
        }
    }
}
