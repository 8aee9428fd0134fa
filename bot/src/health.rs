use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobFamily {
    Airport,
    Flight,
    Controller,
}

impl JobFamily {
    const ALL: [Self; 3] = [Self::Airport, Self::Flight, Self::Controller];

    const fn label(self) -> &'static str {
        match self {
            Self::Airport => "airport notifications",
            Self::Flight => "flight trackers",
            Self::Controller => "controller trackers",
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    cache: Arc<tokio::sync::RwLock<Option<Arc<serenity::cache::Cache>>>>,
    last_cycles: Arc<RwLock<HashMap<JobFamily, DateTime<Utc>>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(tokio::sync::RwLock::new(None)),
            last_cycles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn set_cache(&self, cache: Arc<serenity::cache::Cache>) {
        *self.cache.write().await = Some(cache);
    }

    pub fn mark_cycle(&self, family: JobFamily) {
        self.last_cycles.write().insert(family, Utc::now());
    }

    async fn is_connected(&self) -> bool {
        self.cache.read().await.is_some()
    }

    fn cycle_report(&self) -> String {
        let cycles = self.last_cycles.read();
        JobFamily::ALL
            .iter()
            .map(|family| match cycles.get(family) {
                Some(at) => format!("{}: last cycle {at}", family.label()),
                None => format!("{}: no completed cycle yet", family.label()),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn serve_health(
    state: HealthState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(%addr, "starting health server");
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    Ok(())
}

async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    if state.is_connected().await {
        (StatusCode::OK, state.cycle_report())
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "gateway not connected".to_string(),
        )
    }
}
