//! Call Bridge Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_bridge_agent::{Collaborators, ConversationStore};
use call_bridge_config::{load_settings, Settings};
use call_bridge_pipeline::{DeepgramConfig, DeepgramRecognizer};
use call_bridge_rag::{HttpKnowledgeClient, KnowledgeClientConfig};
use call_bridge_server::{create_router, init_metrics, AppState};
use call_bridge_telephony::{TwilioCallControl, TwilioConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.toml > config/default.toml > defaults
    let env = std::env::var("CALL_BRIDGE_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(&config);

    tracing::info!("Starting Call Bridge Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        init_metrics()?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let collaborators = build_collaborators(&config)?;
    tracing::info!(
        speech = collaborators.recognizer.name(),
        knowledge = collaborators.knowledge.name(),
        call_control = collaborators.control.name(),
        "Initialized adapters"
    );
    warn_missing_credentials(&config);

    let history_cleanup = collaborators
        .conversations
        .start_cleanup_task(config.call.history_retention());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::with_env(config, collaborators, env);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on SIGTERM/SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    history_cleanup.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

fn build_collaborators(config: &Settings) -> Result<Collaborators, Box<dyn std::error::Error>> {
    let recognizer = DeepgramRecognizer::new(DeepgramConfig {
        endpoint: config.transcription.endpoint.clone(),
        api_key: config.transcription.api_key.clone().unwrap_or_default(),
        ..DeepgramConfig::default()
    });
    let knowledge = HttpKnowledgeClient::new(KnowledgeClientConfig::from(&config.knowledge))?;
    let control = TwilioCallControl::new(TwilioConfig::from(&config.telephony))?;

    Ok(Collaborators {
        recognizer: Arc::new(recognizer),
        knowledge: Arc::new(knowledge),
        control: Arc::new(control),
        conversations: Arc::new(ConversationStore::from_config(&config.call)),
    })
}

/// Development runs start without credentials; say what will fail
fn warn_missing_credentials(config: &Settings) {
    let missing = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

    if missing(&config.transcription.api_key) {
        tracing::warn!("DEEPGRAM_API_KEY not set, transcription sessions will fail to open");
    }
    if missing(&config.knowledge.user_id) {
        tracing::warn!("CALLWISE_API not set, knowledge queries will fail");
    }
    if missing(&config.telephony.account_sid)
        || missing(&config.telephony.api_key_sid)
        || missing(&config.telephony.api_secret)
    {
        tracing::warn!("Twilio credentials incomplete, answers cannot be injected into calls");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("call_bridge={level},call_bridge_server={level},call_bridge_agent={level},call_bridge_pipeline={level},call_bridge_rag={level},call_bridge_telephony={level},tower_http=debug").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
