//! Anbindung der Relay-Zaehlpunkte an die Prometheus-Metriken

use oct_observability::RelayMetrics;
use oct_relay::{RelayMetriken, RoomManager};

/// [`RelayMetriken`] auf Basis der Prometheus-Registry
pub struct PrometheusRelayMetriken(pub RelayMetrics);

impl RelayMetriken for PrometheusRelayMetriken {
    fn anfrage_weitergeleitet(&self) {
        self.0.requests_relayed_total.inc();
    }

    fn anfrage_zeitueberschreitung(&self) {
        self.0.requests_timed_out_total.inc();
    }

    fn broadcast_verteilt(&self) {
        self.0.broadcasts_total.inc();
    }

    fn schluessel_fehlt(&self) {
        self.0.broadcast_keys_missing_total.inc();
    }
}

/// Uebernimmt Raum- und Peer-Zahlen aus dem RoomManager
pub fn gauges_aktualisieren(metriken: &RelayMetrics, raeume: &RoomManager) {
    metriken.rooms_active.set(raeume.anzahl_raeume() as i64);
    metriken.peers_connected.set(raeume.anzahl_peers() as i64);
}
