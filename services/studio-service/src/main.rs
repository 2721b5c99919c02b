use anyhow::Context;
use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use ipf_api_types::SubmitReceiptView;
use ipf_chain_loreweave::{LOREWEAVE_MAINNET, LOREWEAVE_TESTNET, LoreweaveGateway};
use ipf_market::{InMemoryListingStore, ListingStore, Marketplace, RocksDbListingStore};
use ipf_protocol_client::{ProtocolClient, StaticProtocolClient};
use ipf_submit::SubmissionRouter;
use ipf_wizard::WizardSession;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

mod market;
mod pins;
mod protocol_config;
mod sessions;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    /// Receipts from protocol calls that landed before a batch stopped
    /// partway. Everything listed here is registered on chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_receipts: Option<Vec<SubmitReceiptView>>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Environment-derived service settings, read once at startup.
#[derive(Debug, Clone)]
struct ServiceConfig {
    addr: SocketAddr,
    gateway_url: Option<String>,
    listing_db_path: Option<String>,
    pinning_url: Option<String>,
    environment: String,
}

impl ServiceConfig {
    fn from_env() -> anyhow::Result<Self> {
        let addr = match std::env::var("STUDIO_SERVICE_ADDR") {
            Ok(raw) => raw
                .parse()
                .context("STUDIO_SERVICE_ADDR must be a host:port pair")?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 8090)),
        };
        Ok(Self {
            addr,
            gateway_url: env_opt("LOREWEAVE_GATEWAY_URL"),
            listing_db_path: env_opt("IPF_LISTING_DB_PATH"),
            pinning_url: env_opt("IPF_PINNING_URL"),
            environment: env_opt("IPF_ENVIRONMENT").unwrap_or_else(|| "testnet".to_owned()),
        })
    }

    fn chain_slug(&self) -> &'static str {
        if self.environment == "mainnet" {
            LOREWEAVE_MAINNET
        } else {
            LOREWEAVE_TESTNET
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

struct AppState {
    config: ServiceConfig,
    sessions: RwLock<HashMap<Uuid, WizardSession>>,
    market: Arc<Marketplace>,
    router: SubmissionRouter,
    http: reqwest::Client,
}

fn build_state(config: ServiceConfig) -> anyhow::Result<Arc<AppState>> {
    let client: Arc<dyn ProtocolClient> = match &config.gateway_url {
        Some(url) => Arc::new(LoreweaveGateway::new(config.chain_slug(), Some(url.clone()))),
        None => Arc::new(StaticProtocolClient::new(config.chain_slug())),
    };
    let store: Arc<dyn ListingStore> = match &config.listing_db_path {
        Some(path) => Arc::new(
            RocksDbListingStore::open_default(path)
                .with_context(|| format!("failed to open listing db at {path}"))?,
        ),
        None => Arc::new(InMemoryListingStore::default()),
    };
    let market = Arc::new(Marketplace::new(store, client.clone()));
    let router = SubmissionRouter::new(client, market.clone());

    Ok(Arc::new(AppState {
        config,
        sessions: RwLock::new(HashMap::new()),
        market,
        router,
        http: reqwest::Client::new(),
    }))
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/protocol/config", get(protocol_config::protocol_config))
        .route("/cards", get(sessions::list_cards))
        .route("/cards/{card_id}", get(sessions::get_card))
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::cancel_session),
        )
        .route("/sessions/{id}/answers", post(sessions::answer))
        .route("/sessions/{id}/next", post(sessions::next_step))
        .route("/sessions/{id}/back", post(sessions::back_step))
        .route(
            "/sessions/{id}/pil",
            post(sessions::attach_pil).delete(sessions::clear_pil),
        )
        .route("/sessions/{id}/register-more", post(sessions::register_more))
        .route("/sessions/{id}/summary", get(sessions::summary))
        .route("/sessions/{id}/submit", post(sessions::submit))
        .route(
            "/listings",
            get(market::list_listings).post(market::create_listing),
        )
        .route("/listings/{id}/purchase", post(market::purchase))
        .route("/uploads/json", post(pins::upload_json))
        .route("/uploads/file", post(pins::upload_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let addr = config.addr;
    if config.gateway_url.is_none() {
        info!("LOREWEAVE_GATEWAY_URL not set; protocol calls use the in-process static client");
    }
    let state = build_state(config)?;

    let app = app(state);
    info!("studio-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            warn!("failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "studio-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "studio-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error_body(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: message.into(),
        partial_receipts: None,
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(error_body(message)))
}

fn not_found(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(error_body(message)))
}

fn conflict(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::CONFLICT, Json(error_body(message)))
}

fn bad_gateway(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_GATEWAY, Json(error_body(err.to_string())))
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(error_body(err.to_string())),
    )
}

fn to_hex(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
