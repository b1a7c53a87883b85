//! Streaming speech-to-text
//!
//! - [`TranscriptionSession`] - lifecycle of one live stream, used as the pacer's sink
//! - [`DeepgramRecognizer`] - Deepgram live websocket backend

mod deepgram;
mod session;

pub use deepgram::{parse_message, DeepgramConfig, DeepgramRecognizer, DeepgramStream};
pub use session::{TranscriptionSession, TranscriptionState};
