//! Audio frame types
//!
//! Frames carry encoded audio exactly as it arrived from the call transport.
//! Nothing in the bridge decodes samples; the payload is forwarded to the
//! speech backend with the encoding advertised in the live options.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Wire encoding of call audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// G.711 mu-law, 8-bit (telephony default)
    #[default]
    Mulaw,
    /// G.711 A-law, 8-bit
    Alaw,
    /// Signed 16-bit little-endian PCM
    Linear16,
}

impl AudioEncoding {
    /// Encoding name as understood by the speech backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mulaw => "mulaw",
            Self::Alaw => "alaw",
            Self::Linear16 => "linear16",
        }
    }

    /// Bytes per mono sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Mulaw | Self::Alaw => 1,
            Self::Linear16 => 2,
        }
    }

    /// Byte value encoding digital silence
    pub fn silence_byte(&self) -> u8 {
        match self {
            // mu-law zero amplitude is 0xFF, A-law is 0xD5
            Self::Mulaw => 0xFF,
            Self::Alaw => 0xD5,
            Self::Linear16 => 0x00,
        }
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a silence payload of the given duration
pub fn silence_frame(encoding: AudioEncoding, sample_rate: u32, duration_ms: u32) -> Bytes {
    let samples = sample_rate as usize * duration_ms as usize / 1000;
    let len = samples * encoding.bytes_per_sample();
    Bytes::from(vec![encoding.silence_byte(); len])
}

/// One chunk of call audio
///
/// Immutable once created. `sequence` is the arrival order assigned by the
/// receive loop; the queue preserves it.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    /// Arrival sequence number (monotonic per call)
    pub sequence: u64,
    /// Encoded audio payload
    pub payload: Bytes,
    /// When the frame arrived from the transport
    pub received_at: Instant,
}

impl MediaFrame {
    /// Create a frame stamped with the current instant
    pub fn new(sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
            received_at: Instant::now(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mulaw_silence_frame() {
        // 20ms at 8kHz mu-law
        let frame = silence_frame(AudioEncoding::Mulaw, 8000, 20);
        assert_eq!(frame.len(), 160);
        assert!(frame.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_linear16_silence_frame() {
        let frame = silence_frame(AudioEncoding::Linear16, 16000, 10);
        assert_eq!(frame.len(), 320);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encoding_serde_names() {
        let json = serde_json::to_string(&AudioEncoding::Linear16).unwrap();
        assert_eq!(json, "\"linear16\"");
        let parsed: AudioEncoding = serde_json::from_str("\"mulaw\"").unwrap();
        assert_eq!(parsed, AudioEncoding::Mulaw);
    }
}
