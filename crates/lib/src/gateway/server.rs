//! Webhook HTTP server (single port): health check plus the LINE webhook route.

use crate::bot::{Bot, BotSettings};
use crate::channels::{line, LineChannel, ReplySender};
use crate::config::{self, Config};
use crate::handoff::MemoryHandoffStore;
use crate::init;
use crate::llm::OpenAiClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub bot: Arc<Bot>,
    pub sender: Arc<dyn ReplySender>,
    /// When set, webhook bodies must carry a matching X-Line-Signature.
    pub channel_secret: Option<String>,
}

/// Build the bot for `config`: profile, in-memory hand-off store, and completion client.
pub fn build_bot(config: &Config, config_path: &Path) -> Result<Bot> {
    let profile = init::load_profile(config, config_path)?;
    let completion = OpenAiClient::new(
        config::resolve_completion_api_key(config),
        Some(config.completion.base_url.clone()),
        config.completion.model.clone(),
        config.completion.temperature,
        config.completion.timeout(),
    )
    .context("building completion client")?;
    log::info!(
        "completion: model {} at {}",
        completion.model(),
        config.completion.base_url
    );
    let settings = BotSettings {
        handoff_ttl: config::resolve_handoff_ttl(config),
        completion_timeout: config.completion.timeout(),
        build: config::resolve_build_id(),
    };
    let bot = Bot::new(
        profile,
        Arc::new(MemoryHandoffStore::new()),
        Arc::new(completion),
        settings,
    )?;
    Ok(bot)
}

/// Routes: `GET /` health and the webhook path (any method).
pub fn router(state: GatewayState) -> Router {
    let webhook_path = state.config.gateway.webhook_path.trim().to_string();
    Router::new()
        .route("/", get(health_http))
        .route(&webhook_path, any(webhook))
        .with_state(state)
}

/// Run the webhook server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a LINE channel secret must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
/// `config_path` is the path to the config file (used to resolve the profile).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let channel_secret = config::resolve_line_channel_secret(&config);
    if !config::is_loopback_bind(&bind) && channel_secret.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without signature verification (set line.channelSecret or LINE_CHANNEL_SECRET)",
            bind
        );
    }
    let webhook_path = config.gateway.webhook_path.trim();
    if !webhook_path.starts_with('/') || webhook_path == "/" {
        anyhow::bail!(
            "gateway.webhookPath must start with '/' and differ from the health route (got {:?})",
            webhook_path
        );
    }
    if channel_secret.is_none() {
        log::warn!("line channel secret not set; webhook signatures are not verified");
    }

    let bot = build_bot(&config, &config_path)?;
    log::info!(
        "serving profile {:?} (build {}, hand-off {} min)",
        bot.profile().store_name,
        bot.settings().build,
        bot.settings().handoff_ttl.as_secs() / 60
    );
    let access_token = config::resolve_line_access_token(&config);
    if access_token.is_none() {
        log::warn!("line channel access token not set; replies will fail");
    }
    let line = LineChannel::new(
        access_token,
        config.line.api_base.clone(),
        config.line.timeout(),
    )
    .context("building line reply client")?;

    let port = config.gateway.port;
    let state = GatewayState {
        config: Arc::new(config),
        bot: Arc::new(bot),
        sender: Arc::new(line),
        channel_secret,
    };
    let app = router(state.clone());

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} (webhook {})",
        bind_addr,
        state.config.gateway.webhook_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight webhook requests finish before the server returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight webhooks");
}

/// Webhook route. Non-POST requests get 200 "ok" (platform verification pings).
/// POST: check the signature, handle every text event, then acknowledge with 200 "ok".
/// Malformed bodies are logged and still acknowledged so the platform does not retry them.
async fn webhook(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if method != Method::POST {
        return (StatusCode::OK, "ok");
    }
    if let Some(ref secret) = state.channel_secret {
        let provided = headers
            .get(line::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !line::verify_signature(secret, &body, provided) {
            log::warn!("webhook: signature mismatch, rejecting {} byte body", body.len());
            return (StatusCode::FORBIDDEN, "forbidden");
        }
    }
    let events = match line::parse_webhook_events(&body) {
        Ok(events) => events,
        Err(e) => {
            log::warn!("webhook: unparsable body: {}", e);
            return (StatusCode::OK, "ok");
        }
    };
    if events.is_empty() {
        return (StatusCode::OK, "ok");
    }
    let batch = uuid::Uuid::new_v4();
    log::info!("webhook: batch {} with {} text event(s)", batch, events.len());
    state
        .bot
        .handle_batch(Arc::clone(&state.sender), events)
        .await;
    log::debug!("webhook: batch {} done", batch);
    (StatusCode::OK, "ok")
}

/// GET / returns a simple health JSON (for health checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "build": state.bot.settings().build,
        "port": state.config.gateway.port,
        "profile": state.bot.profile().store_name,
    }))
}
