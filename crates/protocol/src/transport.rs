//! Transport-Abstraktion
//!
//! Ein Transport transportiert fertige [`Message`]-Umschlaege zwischen
//! Client und Relay. Welcher Transport verwendet wird, handelt der Client
//! beim Verbindungsaufbau ueber die `id()` der Provider aus.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::Message;

/// Header beim Verbindungsaufbau
pub mod header {
    /// Raum-Token (bzw. Login-Token bei REST-Aufrufen)
    pub const JWT: &str = "x-oct-jwt";
    pub const PUBLIC_KEY: &str = "x-oct-public-key";
    pub const CLIENT: &str = "x-oct-client";
    pub const COMPRESSION: &str = "x-oct-compression";
}

/// Pfad des WebSocket-Endpunkts relativ zur Basis-URL
pub const WEBSOCKET_PFAD: &str = "/api/session/ws";

/// Bezeichner des WebSocket-Transports
pub const WEBSOCKET_ID: &str = "websocket";

/// Fehler auf Transportebene
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Transport geschlossen")]
    Geschlossen,

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),
}

/// Offene, bidirektionale Verbindung
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Sendet einen Umschlag
    async fn senden(&self, nachricht: Message) -> Result<(), TransportError>;

    /// Schliesst die Verbindung
    async fn schliessen(&self);
}

/// Eine geoeffnete Verbindung: Sende-Seite plus Strom eingehender Umschlaege
pub struct TransportVerbindung {
    pub transport: Box<dyn MessageTransport>,
    pub eingang: mpsc::Receiver<Message>,
}

/// Fabrik fuer Transporte einer Art
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Stabiler Bezeichner fuer die Aushandlung (z.B. "websocket")
    fn id(&self) -> &str;

    /// Oeffnet eine Verbindung zum Relay unter `basis_url`
    async fn verbinden(
        &self,
        basis_url: &str,
        headers: HashMap<String, String>,
    ) -> Result<TransportVerbindung, TransportError>;
}
