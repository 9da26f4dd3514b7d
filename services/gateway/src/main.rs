use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sphero_core::{Orchestrator, OrchestratorConfig, SimulatedLink};
use sphero_realtime::CredentialBroker;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::fmt::time::ChronoLocal;

mod config;
mod socket;
mod speech;

use config::Config;
use speech::{NullSpeechConnector, OpenAiSpeechConnector};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    broker: Option<Arc<CredentialBroker>>,
}

/// Mints an ephemeral realtime credential for a browser-held voice session.
async fn session_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let Some(broker) = state.broker.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "OPENAI_API_KEY is not configured"})),
        ));
    };
    match broker.mint().await {
        Ok(credential) => Ok(Json(credential.raw)),
        Err(e) => {
            tracing::error!("failed to mint realtime credential: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load gateway configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded. Starting Sphero gateway...");

    let broker = config
        .openai_api_key
        .clone()
        .map(|key| Arc::new(CredentialBroker::new(key)));

    let connector: Arc<dyn sphero_core::SpeechConnector> = match broker.clone() {
        Some(broker) => Arc::new(OpenAiSpeechConnector::new(broker)),
        None => {
            tracing::warn!("OPENAI_API_KEY not set; voice sessions are disabled");
            Arc::new(NullSpeechConnector)
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(SimulatedLink::new()),
        connector,
        OrchestratorConfig {
            command_timeout: config.command_timeout,
            max_speed: config.max_speed,
            max_brightness: config.max_brightness,
            ..OrchestratorConfig::default()
        },
    );

    let state = AppState {
        orchestrator: orchestrator.clone(),
        broker,
    };

    // A separate frontend connects to the socket, so CORS stays permissive.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/ws",
            get(socket::ws_handler).with_state(orchestrator.clone()),
        )
        .route("/session", post(session_handler).with_state(state))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
