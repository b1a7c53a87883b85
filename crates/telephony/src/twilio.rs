//! Twilio call control

use std::time::Duration;

use async_trait::async_trait;
use call_bridge_config::TelephonyConfig;
use call_bridge_core::{CallControl, CallScript};
use reqwest::Client;

use crate::{twiml, TelephonyError};

/// Twilio REST credentials
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub api_key_sid: Option<String>,
    pub api_secret: Option<String>,
    /// REST API base, e.g. `https://api.twilio.com`
    pub api_base: String,
    pub timeout: Duration,
}

impl From<&TelephonyConfig> for TwilioConfig {
    fn from(config: &TelephonyConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            api_key_sid: config.api_key_sid.clone(),
            api_secret: config.api_secret.clone(),
            api_base: config.api_base.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Injects TwiML into live calls via the Calls resource
///
/// Missing credentials are reported per request, so a development server
/// starts without them and logs each failed injection.
pub struct TwilioCallControl {
    client: Client,
    config: TwilioConfig,
}

impl TwilioCallControl {
    pub fn new(config: TwilioConfig) -> Result<Self, TelephonyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TelephonyError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Calls resource URL for one call
    pub fn call_url(&self, call_sid: &str) -> Result<String, TelephonyError> {
        let account_sid = credential(&self.config.account_sid, "account_sid")?;
        Ok(format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base.trim_end_matches('/'),
            account_sid,
            call_sid
        ))
    }

    /// Replace the call's current TwiML
    pub async fn update_call(&self, call_sid: &str, script: &CallScript) -> Result<(), TelephonyError> {
        if script.is_empty() {
            return Err(TelephonyError::InvalidScript("script is empty".to_string()));
        }

        let url = self.call_url(call_sid)?;
        let key_sid = credential(&self.config.api_key_sid, "api_key_sid")?;
        let secret = credential(&self.config.api_secret, "api_secret")?;
        let body = twiml::render(script);

        let response = self
            .client
            .post(&url)
            .basic_auth(key_sid, Some(secret))
            .form(&[("Twiml", body.as_str())])
            .send()
            .await
            .map_err(|e| TelephonyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(call_sid, instructions = script.len(), "Call updated");
        Ok(())
    }
}

fn credential<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, TelephonyError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(TelephonyError::MissingCredential(name))
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn inject(&self, call_sid: &str, script: &CallScript) -> call_bridge_core::Result<()> {
        let result = self.update_call(call_sid, script).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("call_bridge_call_updates_total", "outcome" => outcome).increment(1);
        result.map_err(Into::into)
    }

    fn name(&self) -> &str {
        "twilio"
    }
}
