//! Media stream wire events
//!
//! The call transport sends JSON text frames tagged by `event`:
//! `connected`, `start`, `media` and `stop`. Unknown events deserialize to
//! [`MediaStreamEvent::Unknown`] and are ignored by the session.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::audio::AudioEncoding;

/// Inbound media stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
        start: StreamStart,
    },
    Media {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Stop {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
        #[serde(default)]
        stop: Option<StreamStop>,
    },
    #[serde(other)]
    Unknown,
}

impl MediaStreamEvent {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Stop { .. } => "stop",
            Self::Unknown => "unknown",
        }
    }
}

/// Payload of the `start` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub call_sid: String,
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

/// Audio format announced in the `start` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    /// e.g. `audio/x-mulaw`
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_channels() -> u16 {
    1
}

impl MediaFormat {
    /// Map the MIME-style encoding name onto a known encoding
    pub fn audio_encoding(&self) -> Option<AudioEncoding> {
        match self.encoding.to_ascii_lowercase().as_str() {
            "audio/x-mulaw" | "mulaw" | "audio/pcmu" => Some(AudioEncoding::Mulaw),
            "audio/x-alaw" | "alaw" | "audio/pcma" => Some(AudioEncoding::Alaw),
            "audio/l16" | "linear16" => Some(AudioEncoding::Linear16),
            _ => None,
        }
    }
}

/// Payload of the `media` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-encoded audio
    pub payload: String,
}

impl MediaPayload {
    /// Decode the base64 audio payload
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.payload.as_bytes())
    }
}

/// Payload of the `stop` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStop {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
}
