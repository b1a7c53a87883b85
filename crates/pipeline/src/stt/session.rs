//! Transcription session lifecycle
//!
//! One session wraps one live recognition stream for the lifetime of a call:
//!
//! ```text
//! Uninitialized ──open──▶ Connecting ──▶ Streaming ──close──▶ Closing ──▶ Closed
//!                             └──(connect failed / timed out)──────────────▲
//! ```
//!
//! The session never reconnects. Closing is idempotent and releases the
//! backend stream exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use call_bridge_core::{LiveOptions, RecognizerEvent, RecognizerStream, SpeechRecognizer};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::pacer::AudioSink;
use crate::PipelineError;

/// Transcription session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionState {
    Uninitialized,
    Connecting,
    Streaming,
    Closing,
    Closed,
}

impl std::fmt::Display for TranscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One live recognition stream
pub struct TranscriptionSession {
    recognizer: Arc<dyn SpeechRecognizer>,
    options: LiveOptions,
    connect_timeout: Duration,
    event_buffer: usize,
    state: Mutex<TranscriptionState>,
    stream: tokio::sync::Mutex<Option<Box<dyn RecognizerStream>>>,
}

impl TranscriptionSession {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        options: LiveOptions,
        connect_timeout: Duration,
        event_buffer: usize,
    ) -> Self {
        Self {
            recognizer,
            options,
            connect_timeout,
            event_buffer: event_buffer.max(1),
            state: Mutex::new(TranscriptionState::Uninitialized),
            stream: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> TranscriptionState {
        *self.state.lock()
    }

    pub fn options(&self) -> &LiveOptions {
        &self.options
    }

    /// Connect to the backend and return the event channel
    pub async fn open(&self) -> Result<mpsc::Receiver<RecognizerEvent>, PipelineError> {
        {
            let mut state = self.state.lock();
            if *state != TranscriptionState::Uninitialized {
                return Err(PipelineError::AlreadyOpened(*state));
            }
            *state = TranscriptionState::Connecting;
        }

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let connected =
            tokio::time::timeout(self.connect_timeout, self.recognizer.connect(&self.options, tx))
                .await;

        let mut stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                *self.state.lock() = TranscriptionState::Closed;
                return Err(PipelineError::Connect(e.to_string()));
            }
            Err(_) => {
                *self.state.lock() = TranscriptionState::Closed;
                return Err(PipelineError::Timeout(self.connect_timeout.as_millis() as u64));
            }
        };

        // Store the stream before announcing Streaming so send() always finds it
        let mut slot = self.stream.lock().await;
        let still_connecting = {
            let mut state = self.state.lock();
            if *state == TranscriptionState::Connecting {
                *state = TranscriptionState::Streaming;
                true
            } else {
                false
            }
        };

        if !still_connecting {
            // Closed while connecting
            drop(slot);
            if let Err(e) = stream.finish().await {
                tracing::debug!(error = %e, "Finish after early close failed");
            }
            return Err(PipelineError::NotStreaming(self.state()));
        }

        *slot = Some(stream);
        tracing::info!(
            backend = self.recognizer.name(),
            model = %self.options.model,
            language = %self.options.language,
            "Transcription session streaming"
        );

        Ok(rx)
    }

    /// Forward one audio chunk; only valid while streaming
    pub async fn send(&self, audio: Bytes) -> Result<(), PipelineError> {
        let state = self.state();
        if state != TranscriptionState::Streaming {
            return Err(PipelineError::NotStreaming(state));
        }

        let mut slot = self.stream.lock().await;
        match slot.as_mut() {
            Some(stream) => stream.send_audio(audio).await.map_err(PipelineError::from),
            None => Err(PipelineError::NotStreaming(self.state())),
        }
    }

    /// Flush and release the backend stream (idempotent)
    pub async fn close(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock();
            match *state {
                TranscriptionState::Closing | TranscriptionState::Closed => return Ok(()),
                TranscriptionState::Uninitialized | TranscriptionState::Connecting => {
                    *state = TranscriptionState::Closed;
                    return Ok(());
                }
                TranscriptionState::Streaming => *state = TranscriptionState::Closing,
            }
        }

        let stream = self.stream.lock().await.take();
        let result = match stream {
            Some(mut stream) => stream.finish().await.map_err(PipelineError::from),
            None => Ok(()),
        };

        *self.state.lock() = TranscriptionState::Closed;

        match &result {
            Ok(()) => tracing::info!(backend = self.recognizer.name(), "Transcription session closed"),
            Err(e) => tracing::warn!(error = %e, "Transcription session closed with error"),
        }
        result
    }

    /// `close` with a deadline; a backend that does not finish in time is dropped
    pub async fn close_within(&self, limit: Duration) -> Result<(), PipelineError> {
        match tokio::time::timeout(limit, self.close()).await {
            Ok(result) => result,
            Err(_) => {
                // Timed out before take() if the stream lock was still held
                if let Ok(mut slot) = self.stream.try_lock() {
                    slot.take();
                }
                *self.state.lock() = TranscriptionState::Closed;
                tracing::warn!(
                    backend = self.recognizer.name(),
                    timeout_ms = limit.as_millis() as u64,
                    "Transcription session did not close in time, stream dropped"
                );
                Err(PipelineError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == TranscriptionState::Streaming
    }

    pub fn is_closed(&self) -> bool {
        self.state() == TranscriptionState::Closed
    }
}

#[async_trait]
impl AudioSink for TranscriptionSession {
    async fn send_audio(&self, audio: Bytes) -> Result<(), PipelineError> {
        self.send(audio).await
    }

    async fn abort(&self) {
        if let Err(e) = self.close().await {
            tracing::debug!(error = %e, "Close after fatal send error failed");
        }
    }
}
