//! Gateway HTTP server: health probe and the inbound activity endpoint.

use crate::activity::ConversationEvent;
use crate::card::WelcomeCard;
use crate::config::{self, Config, GatewayConfig};
use crate::connector::BotConnectorClient;
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::init;
use crate::recorder::JsonFileRecorder;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Shared state for the gateway handlers.
#[derive(Clone)]
struct GatewayState {
    port: u16,
    /// Sender for parsed conversation-update events and their receipt time. The processor task receives.
    inbound_tx: mpsc::Sender<(ConversationEvent, Instant)>,
}

/// Build the dispatcher from validated config: REST connector, JSON-file recorder, welcome card.
/// Fails when the config is not initialized or a required bot setting is missing.
pub async fn build_dispatcher(config: &Config, config_path: &Path) -> Result<Dispatcher> {
    let settings = init::require_initialized(config_path, config)?;
    let store_path = config::resolve_store_path(config, config_path);
    let recorder = JsonFileRecorder::load(&store_path).await;
    log::info!("installation store at {}", store_path.display());
    let connector = BotConnectorClient::new(config::resolve_connector_token(config));
    let card = WelcomeCard::new(
        settings.base_uri,
        config.card.welcome_text.clone(),
        config.card.email_notifications_url.clone(),
    );
    log::debug!("bot app id {}", settings.app_id);
    Ok(Dispatcher::new(
        Arc::new(connector),
        Arc::new(recorder),
        &card,
        DispatchOptions::from(&config.delivery),
    ))
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C), then waits for in-flight events to finish.
/// `config_path` is the path to the config file (used to resolve the installation store).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&config, &config_path).await?);
    serve(&config.gateway, dispatcher, shutdown_signal()).await
}

/// Serve the gateway with the given dispatcher until `shutdown` completes.
pub async fn serve(
    gateway: &GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind = gateway.bind.trim();
    if !config::is_loopback_bind(bind) {
        log::info!("gateway binding to non-loopback address {}", bind);
    }

    let (inbound_tx, inbound_rx) = mpsc::channel::<(ConversationEvent, Instant)>(INBOUND_QUEUE_CAPACITY);
    let processor = tokio::spawn(run_processor(dispatcher, inbound_rx));

    let state = GatewayState {
        port: gateway.port,
        inbound_tx,
    };
    let app = Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(messages_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited")?;
    // The router owned the only sender; once it is gone the processor drains and exits.
    if let Err(e) = processor.await {
        log::warn!("dispatch processor ended abnormally: {}", e);
    }
    log::info!("gateway stopped");
    Ok(())
}

/// Receive events and dispatch each on its own task so a slow event does not hold up later ones.
/// The event deadline runs from receipt, so queueing time counts against it.
async fn run_processor(
    dispatcher: Arc<Dispatcher>,
    mut inbound_rx: mpsc::Receiver<(ConversationEvent, Instant)>,
) {
    let mut in_flight = JoinSet::new();
    while let Some((event, received)) = inbound_rx.recv().await {
        let dispatcher = dispatcher.clone();
        in_flight.spawn(async move {
            let deadline = dispatcher.deadline_for(received);
            dispatcher
                .handle_conversation_update_until(&event, deadline)
                .await;
        });
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                log::error!("dispatch task failed: {}", e);
            }
        }
    }
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            log::error!("dispatch task failed: {}", e);
        }
    }
    log::info!("dispatch queue drained");
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight events");
}

/// POST /api/messages receives activity JSON; queues conversation updates, acknowledges the rest.
async fn messages_webhook(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let received = Instant::now();
    let event: ConversationEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("inbound: rejecting malformed activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if !event.is_conversation_update() {
        log::debug!("inbound: ignoring activity of type {}", event.typ);
        return StatusCode::OK;
    }
    if state.inbound_tx.send((event, received)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}
