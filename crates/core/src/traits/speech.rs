//! Streaming speech recognition traits

use crate::audio::AudioEncoding;
use crate::transcript::TranscriptEvent;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Fixed recognition parameters for a live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOptions {
    pub model: String,
    pub language: String,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u16,
    pub punctuate: bool,
    pub smart_format: bool,
    /// Emit interim results as well as finalized ones
    pub interim_results: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-IN".to_string(),
            encoding: AudioEncoding::Mulaw,
            sample_rate: 8000,
            channels: 1,
            punctuate: true,
            smart_format: true,
            interim_results: false,
        }
    }
}

/// Event delivered by a live recognition stream
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Recognized utterance (interim or final)
    Transcript(TranscriptEvent),
    /// Backend metadata (request id, model info, ...)
    Metadata(serde_json::Value),
    /// Backend reported an error; the stream is unusable afterwards
    Error(String),
    /// Backend closed the stream
    Closed,
}

/// Opens live recognition streams
///
/// Implementations:
/// - `DeepgramRecognizer` - Deepgram live websocket API
///
/// # Example
///
/// ```ignore
/// let (tx, mut rx) = mpsc::channel(64);
/// let mut stream = recognizer.connect(&LiveOptions::default(), tx).await?;
/// stream.send_audio(frame.payload.clone()).await?;
/// stream.finish().await?;
/// ```
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Connect a new live stream
    ///
    /// Events are pushed to `events` until the stream closes. The returned
    /// handle is the only way to send audio.
    async fn connect(
        &self,
        options: &LiveOptions,
        events: mpsc::Sender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognizerStream>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Sending half of a live recognition stream
#[async_trait]
pub trait RecognizerStream: Send + 'static {
    /// Send one chunk of encoded audio
    async fn send_audio(&mut self, audio: Bytes) -> Result<()>;

    /// Flush and close the stream
    ///
    /// Sends the backend's close-stream message. Callers invoke this once.
    async fn finish(&mut self) -> Result<()>;
}
