//! Deepgram live transcription backend
//!
//! Audio goes out as binary websocket frames; results come back as JSON text
//! frames tagged by `type` (`Results`, `Metadata`, `Error`, ...). Sending
//! `{"type":"CloseStream"}` asks the server to flush final results and close.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use call_bridge_core::{
    Error, LiveOptions, RecognizerEvent, RecognizerStream, Result, SpeechRecognizer,
    TranscriptEvent,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;

/// Deepgram connection settings
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    /// Live websocket endpoint
    pub endpoint: String,
    pub api_key: String,
    /// How long `finish` waits for the server to flush final results
    pub flush_timeout: Duration,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: String::new(),
            flush_timeout: Duration::from_secs(2),
        }
    }
}

/// Deepgram live recognizer
pub struct DeepgramRecognizer {
    config: DeepgramConfig,
}

impl DeepgramRecognizer {
    pub fn new(config: DeepgramConfig) -> Self {
        Self { config }
    }

    /// Endpoint with the live options encoded as query parameters
    pub fn listen_url(&self, options: &LiveOptions) -> String {
        let separator = if self.config.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}model={}&language={}&encoding={}&sample_rate={}&channels={}&punctuate={}&smart_format={}&interim_results={}",
            self.config.endpoint,
            separator,
            options.model,
            options.language,
            options.encoding.as_str(),
            options.sample_rate,
            options.channels,
            options.punctuate,
            options.smart_format,
            options.interim_results,
        )
    }
}

#[async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn connect(
        &self,
        options: &LiveOptions,
        events: mpsc::Sender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognizerStream>> {
        let url = self.listen_url(options);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Backend(format!("Invalid Deepgram URL: {}", e)))?;
        let auth: HeaderValue = format!("Token {}", self.config.api_key)
            .parse()
            .map_err(|e| Error::Backend(format!("Invalid Deepgram API key header: {}", e)))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::Backend(format!("Deepgram connect failed: {}", e)))?;

        tracing::debug!(
            status = %response.status(),
            request_id = response
                .headers()
                .get("dg-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-"),
            "Deepgram websocket established"
        );

        let (sink, mut source) = ws_stream.split();

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => match parse_message(text.as_str()) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "Unparseable Deepgram message");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Deepgram closed the stream");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => RecognizerEvent::Error(format!("Deepgram websocket error: {}", e)),
                };

                let is_error = matches!(event, RecognizerEvent::Error(_));
                if events.send(event).await.is_err() || is_error {
                    return;
                }
            }
            let _ = events.send(RecognizerEvent::Closed).await;
        });

        Ok(Box::new(DeepgramStream {
            sink,
            reader,
            flush_timeout: self.config.flush_timeout,
            finished: false,
        }))
    }

    fn name(&self) -> &str {
        "deepgram"
    }
}

/// Sending half of a Deepgram live connection
pub struct DeepgramStream {
    sink: WsSink,
    reader: JoinHandle<()>,
    flush_timeout: Duration,
    finished: bool,
}

#[async_trait]
impl RecognizerStream for DeepgramStream {
    async fn send_audio(&mut self, audio: Bytes) -> Result<()> {
        self.sink
            .send(Message::Binary(audio))
            .await
            .map_err(|e| Error::Backend(format!("Deepgram send failed: {}", e)))
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let sent = match tokio::time::timeout(
            self.flush_timeout,
            self.sink.send(Message::Text(CLOSE_STREAM.into())),
        )
        .await
        {
            Ok(sent) => sent.map_err(|e| Error::Backend(format!("Deepgram close-stream failed: {}", e))),
            Err(_) => Err(Error::Timeout(self.flush_timeout.as_millis() as u64)),
        };

        // Let the reader deliver the final results before dropping the socket
        if sent.is_ok()
            && tokio::time::timeout(self.flush_timeout, &mut self.reader)
                .await
                .is_err()
        {
            tracing::debug!("Deepgram did not close within flush timeout");
        }
        self.reader.abort();

        if tokio::time::timeout(self.flush_timeout, self.sink.close())
            .await
            .is_err()
        {
            tracing::debug!("Deepgram socket close timed out");
        }
        sent
    }
}

impl Drop for DeepgramStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Results(ResultsMessage),
    Metadata(serde_json::Value),
    Error(ErrorMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResultsMessage {
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
    channel: ResultsChannel,
}

#[derive(Debug, Deserialize)]
struct ResultsChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map one Deepgram text frame onto a recognizer event
///
/// Message types the bridge has no use for yield `Ok(None)`.
pub fn parse_message(text: &str) -> std::result::Result<Option<RecognizerEvent>, serde_json::Error> {
    let message: ServerMessage = serde_json::from_str(text)?;

    Ok(match message {
        ServerMessage::Results(results) => {
            let best = results.channel.alternatives.into_iter().next();
            let (text, confidence) = best
                .map(|a| (a.transcript, a.confidence))
                .unwrap_or_default();

            Some(RecognizerEvent::Transcript(TranscriptEvent {
                text,
                is_final: results.is_final,
                confidence,
                start_ms: (results.start * 1000.0) as u64,
                duration_ms: (results.duration * 1000.0) as u64,
                metadata: None,
            }))
        }
        ServerMessage::Metadata(value) => Some(RecognizerEvent::Metadata(value)),
        ServerMessage::Error(error) => Some(RecognizerEvent::Error(
            error
                .description
                .or(error.message)
                .unwrap_or_else(|| "unknown Deepgram error".to_string()),
        )),
        ServerMessage::Other => None,
    })
}
