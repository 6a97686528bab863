//! Prometheus-kompatible Metriken fuer Autokanal
//!
//! Registrierte Metriken:
//! - `autokanal_channels_created_total` – Counter: angelegte Kanaele (kind)
//! - `autokanal_channels_deleted_total` – Counter: geloeschte Kanaele (kind)
//! - `autokanal_overwrite_edits_total` – Counter: geschriebene Sicht-Overwrites
//! - `autokanal_reconcile_errors_total` – Counter: Fehler im Abgleich (kind)
//! - `autokanal_events_total` – Counter: verarbeitete Ereignisse (outcome)
//! - `autokanal_reconcile_duration_seconds` – Histogram: Dauer eines Abgleichs
//! - `autokanal_categories_active` – Gauge: Kategorien mit laufendem Koordinator

use anyhow::Result;
use axum::{Router, response::IntoResponse, routing::get};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Autokanal-Prometheus-Metriken
///
/// Clone teilt die Registry; jede Instanz von `neu()` hat eine eigene.
#[derive(Clone)]
pub struct AutokanalMetrics {
    pub registry: Arc<Registry>,

    // Abgleich
    pub channels_created_total: IntCounterVec,
    pub channels_deleted_total: IntCounterVec,
    pub overwrite_edits_total: IntCounter,
    pub reconcile_errors_total: IntCounterVec,
    pub events_total: IntCounterVec,
    pub reconcile_duration_seconds: Histogram,

    // Prozess
    pub categories_active: IntGauge,
}

impl AutokanalMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let channels_created_total = IntCounterVec::new(
            Opts::new(
                "autokanal_channels_created_total",
                "Anzahl automatisch angelegter Kanaele",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(channels_created_total.clone()))?;

        let channels_deleted_total = IntCounterVec::new(
            Opts::new(
                "autokanal_channels_deleted_total",
                "Anzahl automatisch geloeschter Kanaele",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(channels_deleted_total.clone()))?;

        let overwrite_edits_total = IntCounter::with_opts(Opts::new(
            "autokanal_overwrite_edits_total",
            "Anzahl geschriebener Sicht-Overwrites",
        ))?;
        registry.register(Box::new(overwrite_edits_total.clone()))?;

        let reconcile_errors_total = IntCounterVec::new(
            Opts::new(
                "autokanal_reconcile_errors_total",
                "Fehler waehrend des Abgleichs nach Art",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;

        let events_total = IntCounterVec::new(
            Opts::new(
                "autokanal_events_total",
                "Verarbeitete Mitgliedschafts-Ereignisse nach Ergebnis",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let reconcile_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "autokanal_reconcile_duration_seconds",
                "Dauer eines Abgleichs inklusive Sperr-Wartezeit",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        let categories_active = IntGauge::with_opts(Opts::new(
            "autokanal_categories_active",
            "Kategorien mit laufendem Koordinator",
        ))?;
        registry.register(Box::new(categories_active.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            channels_created_total,
            channels_deleted_total,
            overwrite_edits_total,
            reconcile_errors_total,
            events_total,
            reconcile_duration_seconds,
            categories_active,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: AutokanalMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<AutokanalMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
