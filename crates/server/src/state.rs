//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use call_bridge_agent::{CallSessionConfig, Collaborators, ConversationStore};
use call_bridge_config::{load_settings, Settings};
use parking_lot::RwLock;

use crate::registry::CallRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Wrapped in RwLock for reload; live calls keep the settings they started with
    pub config: Arc<RwLock<Settings>>,
    /// Speech, knowledge and call control adapters shared by every call
    pub collaborators: Collaborators,
    pub calls: Arc<CallRegistry>,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    pub fn new(config: Settings, collaborators: Collaborators) -> Self {
        Self::with_env(config, collaborators, None)
    }

    pub fn with_env(config: Settings, collaborators: Collaborators, env: Option<String>) -> Self {
        let calls = Arc::new(CallRegistry::new(config.server.max_calls));
        Self {
            config: Arc::new(RwLock::new(config)),
            collaborators,
            calls,
            env,
        }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Reload configuration from files
    ///
    /// Applies to calls started afterwards. The call limit and listener
    /// address are fixed at startup.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref())
            .map_err(|e| format!("Failed to reload config: {}", e))?;

        *self.config.write() = new_config;

        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Per-call settings from the current configuration
    pub fn session_config(&self) -> CallSessionConfig {
        CallSessionConfig::from_settings(&self.get_config())
    }

    /// Media stream URL for the given request host
    ///
    /// `server.public_host` wins over the request's Host header.
    pub fn stream_url(&self, request_host: Option<&str>) -> Option<String> {
        let config = self.get_config();
        let host = config
            .server
            .public_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(request_host)?;
        Some(call_bridge_telephony::stream_url(host, &config.server.ws_path))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_bridge_core::{
        CallControl, CallScript, Error, KnowledgeAnswer, KnowledgeQuery, KnowledgeRequest,
        LiveOptions, RecognizerEvent, RecognizerStream, SpeechRecognizer,
    };
    use tokio::sync::mpsc;

    /// Recognizer whose streams accept audio and never transcribe
    pub(crate) struct SilentRecognizer;

    struct SilentStream {
        _events: mpsc::Sender<RecognizerEvent>,
    }

    #[async_trait]
    impl SpeechRecognizer for SilentRecognizer {
        async fn connect(
            &self,
            _options: &LiveOptions,
            events: mpsc::Sender<RecognizerEvent>,
        ) -> call_bridge_core::Result<Box<dyn RecognizerStream>> {
            Ok(Box::new(SilentStream { _events: events }))
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[async_trait]
    impl RecognizerStream for SilentStream {
        async fn send_audio(&mut self, _audio: bytes::Bytes) -> call_bridge_core::Result<()> {
            Ok(())
        }

        async fn finish(&mut self) -> call_bridge_core::Result<()> {
            Ok(())
        }
    }

    pub(crate) struct NoKnowledge;

    #[async_trait]
    impl KnowledgeQuery for NoKnowledge {
        async fn query(&self, _request: &KnowledgeRequest) -> call_bridge_core::Result<KnowledgeAnswer> {
            Err(Error::Query("no knowledge service".into()))
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    pub(crate) struct NoControl;

    #[async_trait]
    impl CallControl for NoControl {
        async fn inject(&self, _call_sid: &str, _script: &CallScript) -> call_bridge_core::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    pub(crate) fn idle_collaborators() -> Collaborators {
        Collaborators {
            recognizer: Arc::new(SilentRecognizer),
            knowledge: Arc::new(NoKnowledge),
            control: Arc::new(NoControl),
            conversations: Arc::new(ConversationStore::default()),
        }
    }

    #[test]
    fn test_stream_url_prefers_public_host() {
        let mut settings = Settings::default();
        let state = AppState::new(settings.clone(), idle_collaborators());
        assert_eq!(
            state.stream_url(Some("abc.ngrok.app")).as_deref(),
            Some("wss://abc.ngrok.app/realtime")
        );
        assert!(state.stream_url(None).is_none());

        settings.server.public_host = Some("bridge.example.com".to_string());
        let state = AppState::new(settings, idle_collaborators());
        assert_eq!(
            state.stream_url(Some("abc.ngrok.app")).as_deref(),
            Some("wss://bridge.example.com/realtime")
        );
    }
}
