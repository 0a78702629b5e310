//! HTTP surface and the periodic sync loop

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::Registry;
use prometheus::proto::MetricFamily;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bucketindex::StaticTenantConfig;
use crate::compactor::{SyncError, SyncReport, TenantSyncer};
use crate::config::Config;
use crate::storage::{StorageClient, build_store};
use crate::tenant_metrics::{TenantRegistries, encode};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared state of the server: the syncer and every metric source
#[derive(Clone)]
pub struct AppState {
    syncer: Arc<Mutex<TenantSyncer>>,
    registry: Registry,
    tenants: Arc<TenantRegistries>,
}

impl AppState {
    /// Build the bucket described by `[storage]` and a syncer over it
    pub fn from_config(config: &Config) -> Result<Self, AnyError> {
        let bucket = build_store(&config.storage)?;
        Self::with_bucket(bucket, config)
    }

    pub fn with_bucket(bucket: StorageClient, config: &Config) -> Result<Self, AnyError> {
        let registry = Registry::new();
        let tenants = Arc::new(TenantRegistries::new());

        let syncer = TenantSyncer::builder()
            .bucket(bucket)
            .provider(Arc::new(StaticTenantConfig::from_config(config)))
            .compactor(config.compactor.clone())
            .fetcher(config.fetcher.clone())
            .registries(Arc::clone(&tenants))
            .registry(&registry)
            .build()?;

        Ok(Self {
            syncer: Arc::new(Mutex::new(syncer)),
            registry,
            tenants,
        })
    }

    /// Run one sync cycle. Concurrent callers are serialized.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let mut syncer = self.syncer.lock().await;
        syncer.run_cycle(cancel).await
    }

    /// Process metrics followed by the per-tenant aggregate
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut families = self.registry.gather();
        families.extend(self.tenants.gather());
        families
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let state = AppState::from_config(&config)?;
    let address = config.server.bind_addr;
    let cancel = CancellationToken::new();

    let sync = tokio::spawn(sync_loop(
        state.clone(),
        config.compactor.sync_interval.as_duration(),
        cancel.clone(),
    ));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "blockyard server listening");

    let shutdown = cancel.clone();
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    sync.await?;
    Ok(())
}

async fn sync_loop(state: AppState, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match state.run_cycle(&cancel).await {
            Ok(_) => {}
            Err(SyncError::Cancelled) => break,
            Err(e) => error!(error = %e, "Sync cycle failed"),
        }
    }
    info!("Sync loop stopped");
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match encode(&state.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    info!("Shutdown signal received");
}
