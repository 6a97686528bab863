//! Health-Check-Endpunkt fuer Autokanal
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl aktiver Kategorien

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::AutokanalMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub categories_active: i64,
    pub categories_configured: usize,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    metriken: AutokanalMetrics,
    konfigurierte_kategorien: usize,
}

impl HealthState {
    pub fn neu(metriken: AutokanalMetrics, konfigurierte_kategorien: usize) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
            konfigurierte_kategorien,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Leitet den Status aus den laufenden Koordinatoren ab
    pub fn status(&self) -> HealthStatus {
        let aktiv = self.metriken.categories_active.get();
        if aktiv <= 0 && self.konfigurierte_kategorien > 0 {
            HealthStatus::Unhealthy
        } else if (aktiv as usize) < self.konfigurierte_kategorien {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Prozessstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.status();

    let http_status = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // 200 auch bei degraded (Probe soll nicht failen)
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        categories_active: state.metriken.categories_active.get(),
        categories_configured: state.konfigurierte_kategorien,
    };

    (http_status, Json(response))
}
