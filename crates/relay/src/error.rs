//! Fehlertypen fuer den Relay

use oct_core::{PeerId, RoomId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Zeitueberschreitung bei Anfrage {schluessel}")]
    RequestTimedOut { schluessel: String },

    #[error("Senden an {peer} fehlgeschlagen")]
    SendFailed { peer: PeerId },

    #[error("Anfrage {schluessel} abgebrochen (Relay beendet)")]
    Abgebrochen { schluessel: String },

    #[error("Peer nicht gefunden: {0}")]
    PeerNichtGefunden(PeerId),

    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(RoomId),

    #[error("Raum existiert bereits: {0}")]
    RaumExistiert(RoomId),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
