//! oct-server - Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod api;
pub mod config;
pub mod fehler;
pub mod metriken;
pub mod sitzung;

use anyhow::Result;
use axum::Router;
use config::ServerConfig;
use oct_observability::{HealthState, RelayMetrics};
use oct_relay::{MessageRelay, RaumEreignis, RoomManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use api::AppState;
use metriken::PrometheusRelayMetriken;
use sitzung::SitzungsSpeicher;

/// Baut den geteilten Zustand aus der Konfiguration
///
/// Registriert die Beobachter des RoomManagers: ein geschlossener Raum
/// verwirft seine offenen Tokens und Beitritte.
pub fn zustand_aufbauen(config: ServerConfig) -> Result<AppState> {
    let metriken = RelayMetrics::neu()?;
    let relay = MessageRelay::neu(
        config.anfrage_timeout(),
        Arc::new(PrometheusRelayMetriken(metriken.clone())),
    );
    let raeume = RoomManager::neu(relay);
    let sitzungen = SitzungsSpeicher::neu(
        config.sitzung.login_ttl_sekunden,
        config.sitzung.token_ttl_sekunden,
    );

    let s = Arc::clone(&sitzungen);
    raeume
        .beobachter()
        .registrieren(Arc::new(move |e: &RaumEreignis| -> oct_core::Result<()> {
            if let RaumEreignis::RaumGeschlossen { raum } = e {
                s.raum_verwerfen(*raum);
            }
            Ok(())
        }));

    Ok(AppState {
        config: Arc::new(config),
        sitzungen,
        raeume,
        metriken,
    })
}

/// Router der Control-Plane fuer einen Zustand
pub fn router(state: AppState) -> Router {
    api::routes::api_router(state)
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Zustand (Relay, Raeume, Tokens) aufbauen
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. HTTP/WebSocket-Listener starten
    /// 4. Auf Ctrl-C warten, dann ausstehende Anfragen abbrechen
    pub async fn starten(self) -> Result<()> {
        let bind = self.config.bind_adresse();
        let observability = self
            .config
            .observability
            .aktiviert
            .then(|| self.config.observability_bind_adresse());

        let state = zustand_aufbauen(self.config)?;
        SitzungsSpeicher::neu_mit_cleanup(Arc::clone(&state.sitzungen));
        let health = HealthState::neu(state.metriken.clone());

        if let Some(adresse) = observability {
            let adresse: SocketAddr = adresse.parse()?;
            let metriken = state.metriken.clone();
            let health = health.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    oct_observability::observability_server_starten(adresse, metriken, health).await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        let relay = state.raeume.relay().clone();
        let app = router(state);
        let listener = TcpListener::bind(&bind).await?;
        tracing::info!(adresse = %bind, "OCT Relay bereit");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Shutdown-Signal nicht verfuegbar");
                }
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                health.bereit_setzen(false);
            })
            .await?;

        relay.alle_abbrechen();
        Ok(())
    }
}
