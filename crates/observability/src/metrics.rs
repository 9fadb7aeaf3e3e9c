//! Prometheus-kompatible Metriken fuer den OCT-Relay
//!
//! Registrierte Metriken:
//! - `oct_rooms_active` - Gauge: Offene Raeume
//! - `oct_peers_connected` - Gauge: Verbundene Peers (Host + Gaeste)
//! - `oct_requests_relayed_total` - Counter: Weitergeleitete Anfragen
//! - `oct_requests_timed_out_total` - Counter: Anfragen ohne Antwort im Timeout
//! - `oct_broadcasts_total` - Counter: Verteilte Broadcasts
//! - `oct_broadcast_keys_missing_total` - Counter: Empfaenger ohne Schluessel im Broadcast
//! - `oct_http_requests_total` - Counter: HTTP-Anfragen (method, path, status)
//! - `oct_http_request_duration_seconds` - Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Relay-Metriken
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    // Raum-Metriken
    pub rooms_active: IntGauge,
    pub peers_connected: IntGauge,

    // Relay-Metriken
    pub requests_relayed_total: IntCounter,
    pub requests_timed_out_total: IntCounter,
    pub broadcasts_total: IntCounter,
    pub broadcast_keys_missing_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let rooms_active = IntGauge::with_opts(Opts::new("oct_rooms_active", "Anzahl offener Raeume"))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let peers_connected = IntGauge::with_opts(Opts::new(
            "oct_peers_connected",
            "Anzahl verbundener Peers",
        ))?;
        registry.register(Box::new(peers_connected.clone()))?;

        let requests_relayed_total = IntCounter::with_opts(Opts::new(
            "oct_requests_relayed_total",
            "Gesamtanzahl weitergeleiteter Anfragen",
        ))?;
        registry.register(Box::new(requests_relayed_total.clone()))?;

        let requests_timed_out_total = IntCounter::with_opts(Opts::new(
            "oct_requests_timed_out_total",
            "Anfragen ohne Antwort innerhalb des Timeouts",
        ))?;
        registry.register(Box::new(requests_timed_out_total.clone()))?;

        let broadcasts_total = IntCounter::with_opts(Opts::new(
            "oct_broadcasts_total",
            "Gesamtanzahl verteilter Broadcasts",
        ))?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        let broadcast_keys_missing_total = IntCounter::with_opts(Opts::new(
            "oct_broadcast_keys_missing_total",
            "Empfaenger ohne Schluessel in verschluesselten Broadcasts",
        ))?;
        registry.register(Box::new(broadcast_keys_missing_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("oct_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "oct_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            rooms_active,
            peers_connected,
            requests_relayed_total,
            requests_timed_out_total,
            broadcasts_total,
            broadcast_keys_missing_total,
            http_requests_total,
            http_request_duration_seconds,
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
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn gauges_setzen() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.rooms_active.inc();
        metriken.peers_connected.add(3);
        metriken.peers_connected.dec();
        assert_eq!(metriken.rooms_active.get(), 1);
        assert_eq!(metriken.peers_connected.get(), 2);
    }

    #[test]
    fn export_enthaelt_relay_metriken() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.broadcasts_total.inc();
        metriken.broadcast_keys_missing_total.inc_by(2);

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("oct_broadcasts_total 1"));
        assert!(output.contains("oct_broadcast_keys_missing_total 2"));
        assert!(output.contains("oct_requests_relayed_total 0"));
        assert!(output.contains("# TYPE oct_rooms_active gauge"));
    }

    #[test]
    fn http_counter_mit_labels() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/api/meta", "200"])
            .inc();
        let wert = metriken
            .http_requests_total
            .with_label_values(&["GET", "/api/meta", "200"])
            .get();
        assert_eq!(wert, 1);
    }

    #[tokio::test]
    async fn metrics_endpunkt() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.requests_timed_out_total.inc();

        let antwort = metrics_router(metriken)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let body = axum::body::to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("oct_requests_timed_out_total 1"));
    }
}
