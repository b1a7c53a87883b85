//! Telephony adapters
//!
//! - TwiML rendering of [`CallScript`]s
//! - [`TwilioCallControl`]: injects TwiML into a live call over the REST API
//!
//! [`CallScript`]: call_bridge_core::CallScript

pub mod twilio;
pub mod twiml;

pub use twilio::{TwilioCallControl, TwilioConfig};
pub use twiml::{escape_xml, render, stream_url};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("Call update request failed: {0}")]
    Request(String),

    #[error("Call update returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Missing telephony credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid call script: {0}")]
    InvalidScript(String),
}

impl From<TelephonyError> for call_bridge_core::Error {
    fn from(err: TelephonyError) -> Self {
        call_bridge_core::Error::CallControl(err.to_string())
    }
}
