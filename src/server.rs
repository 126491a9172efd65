// ABOUTME: HTTP server wiring: shared state, router, session and trace layers
// ABOUTME: Builds the access gate from configuration and serves with connect-info

use anyhow::{Context, Result};
use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use brokersite_core::config::Config;
use brokersite_core::gate::{AccessGate, AdminSecret};
use brokersite_core::lookup::{AddressLookup, PeerAddressLookup};
use brokersite_core::metrics;
use brokersite_core::whitelist::WhitelistSource;

use crate::admin::{self, gate_middleware};
use crate::site;

/// Name of the session cookie carrying the admin flag
pub const SESSION_COOKIE: &str = "brokersite_session";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: AccessGate,
    pub metrics: PrometheusHandle,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("metrics", &"<PrometheusHandle>")
            .finish()
    }
}

impl AppState {
    /// Build the gate from configuration
    pub fn from_config(config: Config, metrics: PrometheusHandle) -> Result<Self> {
        let (password, fallback) = config.admin.password_or_default();
        if fallback {
            tracing::warn!("No admin password configured, using the built-in default");
        }
        let secret = AdminSecret::new(password)?;

        let lookup: Arc<dyn AddressLookup> = Arc::new(PeerAddressLookup);
        let whitelist: Arc<dyn WhitelistSource> =
            Arc::from(config.admin.whitelist_location()?.into_source());

        tracing::info!(
            whitelist = %whitelist.describe(),
            trust_forwarded_for = config.admin.trust_forwarded_for,
            "Access gate configured"
        );

        Ok(Self {
            gate: AccessGate::new(lookup, whitelist, secret),
            config: Arc::new(config),
            metrics,
        })
    }
}

/// Assemble every route plus the gate, session and trace layers
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_expiry(Expiry::OnSessionEnd)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_secure(server.secure_cookies);

    Router::new()
        .route("/", get(site::home))
        .route("/health", get(site::health))
        .route("/metrics", get(metrics_handler))
        .route("/unlock", post(admin::auth::unlock))
        .route("/logout", get(admin::auth::logout).post(admin::auth::logout))
        .nest("/admin", admin::admin_router(&state.config.admin.cms_dir))
        .fallback_service(ServeDir::new(&server.public_dir))
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// Start the web server and run until it fails
pub async fn run(config: Config) -> Result<()> {
    let metrics_handle =
        metrics::init_metrics().context("Failed to initialize Prometheus metrics")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(config, metrics_handle)?;
    let app = build_router(state);

    tracing::info!(addr = %addr, "Starting web server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
