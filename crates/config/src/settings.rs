//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use call_bridge_core::{AudioEncoding, LiveOptions};

use crate::constants::{endpoints, prompts, timing};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - missing credentials allowed
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP/websocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Speech recognition backend
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Outbound audio pacing
    #[serde(default)]
    pub pacer: PacerConfig,

    /// Media frame queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Call session timing and prompts
    #[serde(default)]
    pub call: CallConfig,

    /// Knowledge query service
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Telephony provider
    #[serde(default)]
    pub telephony: TelephonyConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Media stream websocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Incoming call webhook path
    #[serde(default = "default_incoming_call_path")]
    pub incoming_call_path: String,

    /// Public host used in stream URLs; the request `Host` header is used when unset
    #[serde(default)]
    pub public_host: Option<String>,

    /// Maximum concurrent calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_ws_path() -> String {
    "/realtime".to_string()
}
fn default_incoming_call_path() -> String {
    "/".to_string()
}
fn default_max_calls() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            incoming_call_path: default_incoming_call_path(),
            public_host: None,
            max_calls: default_max_calls(),
            cors_enabled: true,
        }
    }
}

/// Speech recognition backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Live websocket endpoint
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,

    /// API key (falls back to `DEEPGRAM_API_KEY`)
    #[serde(default = "default_deepgram_api_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub encoding: AudioEncoding,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default = "default_true")]
    pub punctuate: bool,

    #[serde(default = "default_true")]
    pub smart_format: bool,

    /// Deliver interim results too (finalized-only by default)
    #[serde(default)]
    pub interim_results: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the recognizer event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_transcription_endpoint() -> String {
    endpoints::DEEPGRAM_LIVE.to_string()
}
fn default_deepgram_api_key() -> Option<String> {
    non_empty_env("DEEPGRAM_API_KEY")
}
fn default_model() -> String {
    "nova-2".to_string()
}
fn default_language() -> String {
    "en-IN".to_string()
}
fn default_sample_rate() -> u32 {
    8000
}
fn default_channels() -> u16 {
    1
}
fn default_connect_timeout_ms() -> u64 {
    timing::TRANSCRIPTION_CONNECT_MS
}
fn default_event_buffer() -> usize {
    64
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_transcription_endpoint(),
            api_key: default_deepgram_api_key(),
            model: default_model(),
            language: default_language(),
            encoding: AudioEncoding::default(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            punctuate: true,
            smart_format: true,
            interim_results: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl TranscriptionConfig {
    /// Recognition parameters for a live stream
    pub fn live_options(&self) -> LiveOptions {
        LiveOptions {
            model: self.model.clone(),
            language: self.language.clone(),
            encoding: self.encoding,
            sample_rate: self.sample_rate,
            channels: self.channels,
            punctuate: self.punctuate,
            smart_format: self.smart_format,
            interim_results: self.interim_results,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Outbound audio pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    #[serde(default = "default_pacer_tick_ms")]
    pub tick_ms: u64,

    /// Gap since the last send that triggers a silence frame
    #[serde(default = "default_silence_gap_ms")]
    pub silence_gap_ms: u64,

    /// Duration of each silence frame
    #[serde(default = "default_silence_frame_ms")]
    pub silence_frame_ms: u32,

    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

fn default_pacer_tick_ms() -> u64 {
    timing::PACER_TICK_MS
}
fn default_silence_gap_ms() -> u64 {
    timing::SILENCE_GAP_MS
}
fn default_silence_frame_ms() -> u32 {
    timing::SILENCE_FRAME_MS
}
fn default_dequeue_timeout_ms() -> u64 {
    timing::DEQUEUE_TIMEOUT_MS
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_pacer_tick_ms(),
            silence_gap_ms: default_silence_gap_ms(),
            silence_frame_ms: default_silence_frame_ms(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

/// What to do when the media frame queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered frame to make room
    #[default]
    DropOldest,
    /// Discard the incoming frame
    DropNewest,
}

/// Media frame queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// How long the receive loop waits for space before applying the overflow policy
    #[serde(default = "default_enqueue_wait_ms")]
    pub enqueue_wait_ms: u64,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_queue_capacity() -> usize {
    // 10s of 20ms frames
    500
}
fn default_enqueue_wait_ms() -> u64 {
    50
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            enqueue_wait_ms: default_enqueue_wait_ms(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Call session timing and prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    #[serde(default = "default_call_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Consecutive transport receive errors before the call drains
    #[serde(default = "default_max_receive_errors")]
    pub max_receive_errors: u32,

    /// Conversation turns passed to the knowledge query (0 disables history)
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// How long history outlives the call's last media stream
    #[serde(default = "default_history_retention_secs")]
    pub history_retention_secs: u64,

    #[serde(default = "default_greeting")]
    pub greeting: String,

    #[serde(default = "default_lookup_preamble")]
    pub lookup_preamble: String,

    #[serde(default = "default_continue_prompt")]
    pub continue_prompt: String,

    #[serde(default = "default_keep_alive_prompt")]
    pub keep_alive_prompt: String,

    /// Pause before and after spoken answers (seconds)
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u32,
}

fn default_call_tick_ms() -> u64 {
    timing::CALL_TICK_MS
}
fn default_inactivity_timeout_secs() -> u64 {
    timing::INACTIVITY_TIMEOUT_SECS
}
fn default_drain_timeout_secs() -> u64 {
    timing::DRAIN_TIMEOUT_SECS
}
fn default_max_receive_errors() -> u32 {
    3
}
fn default_history_turns() -> usize {
    10
}
fn default_history_retention_secs() -> u64 {
    timing::HISTORY_RETENTION_SECS
}
fn default_greeting() -> String {
    prompts::GREETING.to_string()
}
fn default_lookup_preamble() -> String {
    prompts::LOOKUP_PREAMBLE.to_string()
}
fn default_continue_prompt() -> String {
    prompts::CONTINUE.to_string()
}
fn default_keep_alive_prompt() -> String {
    prompts::KEEP_ALIVE.to_string()
}
fn default_pause_secs() -> u32 {
    1
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_call_tick_ms(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            max_receive_errors: default_max_receive_errors(),
            history_turns: default_history_turns(),
            history_retention_secs: default_history_retention_secs(),
            greeting: default_greeting(),
            lookup_preamble: default_lookup_preamble(),
            continue_prompt: default_continue_prompt(),
            keep_alive_prompt: default_keep_alive_prompt(),
            pause_secs: default_pause_secs(),
        }
    }
}

impl CallConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }
}

/// Knowledge query service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_endpoint")]
    pub endpoint: String,

    /// Tenant identity sent with each query (falls back to `CALLWISE_API`)
    #[serde(default = "default_user_id")]
    pub user_id: Option<String>,

    #[serde(default = "default_knowledge_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_knowledge_endpoint() -> String {
    endpoints::KNOWLEDGE_QUERY.to_string()
}
fn default_user_id() -> Option<String> {
    non_empty_env("CALLWISE_API")
}
fn default_knowledge_timeout_ms() -> u64 {
    timing::KNOWLEDGE_QUERY_MS
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_knowledge_endpoint(),
            user_id: default_user_id(),
            timeout_ms: default_knowledge_timeout_ms(),
        }
    }
}

/// Telephony provider credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_account_sid")]
    pub account_sid: Option<String>,

    #[serde(default = "default_api_key_sid")]
    pub api_key_sid: Option<String>,

    #[serde(default = "default_api_secret")]
    pub api_secret: Option<String>,

    /// Number the bridge answers on (informational)
    #[serde(default = "default_phone_number")]
    pub phone_number: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_call_control_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_account_sid() -> Option<String> {
    non_empty_env("TWILIO_ACCOUNT_SID")
}
fn default_api_key_sid() -> Option<String> {
    non_empty_env("TWILIO_API_KEY_SID")
}
fn default_api_secret() -> Option<String> {
    non_empty_env("TWILIO_API_SECRET")
}
fn default_phone_number() -> Option<String> {
    non_empty_env("TWILIO_NUMBER")
}
fn default_api_base() -> String {
    endpoints::TWILIO_API_BASE.to_string()
}
fn default_call_control_timeout_ms() -> u64 {
    timing::CALL_CONTROL_MS
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: default_account_sid(),
            api_key_sid: default_api_key_sid(),
            api_secret: default_api_secret(),
            phone_number: default_phone_number(),
            api_base: default_api_base(),
            timeout_ms: default_call_control_timeout_ms(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_timing()?;
        self.validate_credentials()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }

        for (field, path) in [
            ("server.ws_path", &self.server.ws_path),
            ("server.incoming_call_path", &self.server.incoming_call_path),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(field, format!("Path must start with '/', got {path:?}")));
            }
        }

        if self.server.ws_path == self.server.incoming_call_path {
            return Err(invalid(
                "server.ws_path",
                "Websocket path must differ from the incoming call path",
            ));
        }

        if self.server.max_calls == 0 {
            return Err(invalid("server.max_calls", "Must allow at least one call"));
        }

        Ok(())
    }

    fn validate_timing(&self) -> Result<(), ConfigError> {
        let pacer = &self.pacer;
        if pacer.tick_ms == 0 {
            return Err(invalid("pacer.tick_ms", "Must be greater than 0"));
        }
        if pacer.silence_frame_ms == 0 {
            return Err(invalid("pacer.silence_frame_ms", "Must be greater than 0"));
        }
        if pacer.silence_gap_ms <= pacer.tick_ms {
            return Err(invalid(
                "pacer.silence_gap_ms",
                format!(
                    "Must exceed pacer.tick_ms ({}ms), got {}ms",
                    pacer.tick_ms, pacer.silence_gap_ms
                ),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "Must be greater than 0"));
        }

        let call = &self.call;
        if call.tick_ms == 0 {
            return Err(invalid("call.tick_ms", "Must be greater than 0"));
        }
        if call.inactivity_timeout_secs == 0 {
            return Err(invalid("call.inactivity_timeout_secs", "Must be greater than 0"));
        }
        if call.inactivity_timeout_secs * 1000 <= call.tick_ms {
            return Err(invalid(
                "call.inactivity_timeout_secs",
                "Inactivity window must be longer than the call tick",
            ));
        }
        if call.drain_timeout_secs == 0 {
            return Err(invalid("call.drain_timeout_secs", "Must be greater than 0"));
        }
        if call.max_receive_errors == 0 {
            return Err(invalid("call.max_receive_errors", "Must be greater than 0"));
        }

        if self.transcription.sample_rate == 0 {
            return Err(invalid("transcription.sample_rate", "Must be greater than 0"));
        }
        if self.transcription.connect_timeout_ms == 0 {
            return Err(invalid("transcription.connect_timeout_ms", "Must be greater than 0"));
        }
        if self.transcription.event_buffer == 0 {
            return Err(invalid("transcription.event_buffer", "Must be greater than 0"));
        }

        Ok(())
    }

    /// Credentials may be missing in development only
    fn validate_credentials(&self) -> Result<(), ConfigError> {
        if !self.environment.is_strict() {
            return Ok(());
        }

        let required = [
            ("transcription.api_key", &self.transcription.api_key),
            ("knowledge.user_id", &self.knowledge.user_id),
            ("telephony.account_sid", &self.telephony.account_sid),
            ("telephony.api_key_sid", &self.telephony.api_key_sid),
            ("telephony.api_secret", &self.telephony.api_secret),
        ];

        for (field, value) in required {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Load settings from `config/` in the working directory
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a config directory
///
/// Sources in increasing priority:
/// 1. `{dir}/default.{toml,yaml,json}`
/// 2. `{dir}/{env}.{toml,yaml,json}`
/// 3. `CALL_BRIDGE__SECTION__KEY` environment variables
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
