//! Relay server implementation

use anyhow::{Context, Result};
use axum::{
    routing::{any, delete, get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::handlers;
use crate::proxy::RewritingProxy;
use crate::store::{HandoffStore, Reaper};

/// Shared application state
pub struct AppState {
    pub store: Arc<HandoffStore>,
    pub proxy: RewritingProxy,
    pub started: Instant,
}

impl AppState {
    /// Builds the store and proxy described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the upstream HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let store = Arc::new(HandoffStore::new(config.ttl()));
        Self::with_store(store, config)
    }

    /// Like [`from_config`](Self::from_config) around an existing store.
    pub fn with_store(store: Arc<HandoffStore>, config: &RelayConfig) -> Result<Self> {
        let proxy = RewritingProxy::new(Arc::clone(&store), config.proxy_config())
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            store,
            proxy,
            started: Instant::now(),
        })
    }
}

/// Builds the relay router.
///
/// The handoff API gets a permissive CORS layer. Proxy routes are merged in
/// after it so upstream pre-flights and CORS headers are handled by the
/// proxy handlers alone.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/", get(handlers::status::index))
        .route("/health", get(handlers::status::health))
        .route("/debug", get(handlers::status::debug))
        .route(
            "/task/{code}",
            post(handlers::api::publish_task).get(handlers::api::fetch_task),
        )
        .route(
            "/result/{code}",
            post(handlers::api::publish_result).get(handlers::api::fetch_result),
        )
        .route("/clear/{code}", delete(handlers::api::clear))
        .layer(cors);

    // `{*target}` never matches an empty remainder
    let proxy = Router::new()
        .route("/proxy/{code}/{*target}", any(handlers::proxy::forward))
        .route("/proxy/{code}/", any(handlers::proxy::missing_target))
        .route("/proxy/{code}", any(handlers::proxy::missing_target));

    api.merge(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handoff relay server
pub struct RelayServer;

impl RelayServer {
    /// Start the relay and run until Ctrl+C or SIGTERM
    pub async fn start(config: RelayConfig) -> Result<()> {
        let addr = config.addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Self::serve(listener, config, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    ///
    /// The reaper runs for the lifetime of the server and is stopped after
    /// in-flight requests have drained.
    pub async fn serve<F>(listener: TcpListener, config: RelayConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AppState::from_config(&config)?);
        let proxy_config = state.proxy.config();
        if proxy_config.allow_list.is_empty() {
            warn!("no allowed upstream domains configured; every proxy request will be refused");
        }

        let reaper = Reaper::spawn(Arc::clone(&state.store), config.reap_interval());
        let app = router(Arc::clone(&state));

        info!(
            addr = %listener.local_addr()?,
            ttl_secs = config.ttl_secs,
            reap_interval_secs = config.reap_interval_secs,
            allowed_domains = ?proxy_config.allow_list.domains(),
            "relay server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;
        reaper.stop().await;
        served.context("server error")?;

        info!("relay server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
            return;
        }
        info!("received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("received SIGTERM");
            },
            Err(error) => {
                warn!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
