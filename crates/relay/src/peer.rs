//! Peer-Eintraege und ihre Send-Queues

use oct_core::{PeerId, RoomId};
use oct_protocol::types::{Peer as PeerInfo, PeerMitSchluessel};
use oct_protocol::Message;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};

/// Groesse der Send-Queue pro Peer
pub const SEND_QUEUE_GROESSE: usize = 256;

/// Handle auf die Send-Queue eines verbundenen Peers
#[derive(Clone, Debug)]
pub struct PeerChannel {
    peer_id: PeerId,
    tx: mpsc::Sender<Message>,
}

impl PeerChannel {
    /// Erstellt Sende-Handle und Empfangs-Queue
    pub fn neu(peer_id: PeerId) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        (Self { peer_id, tx }, rx)
    }

    /// Reiht eine Nachricht nicht-blockierend ein
    pub fn senden(&self, nachricht: Message) -> RelayResult<()> {
        match self.tx.try_send(nachricht) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer = %self.peer_id, "Send-Queue voll, Nachricht verworfen");
                Err(RelayError::SendFailed { peer: self.peer_id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(peer = %self.peer_id, "Send-Queue geschlossen (Peer getrennt)");
                Err(RelayError::SendFailed { peer: self.peer_id })
            }
        }
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Teilnehmer eines Raums
///
/// `raum` ist nur ein Verweis zum Nachschlagen im RoomManager, kein Besitz.
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub email: Option<String>,
    pub host: bool,
    /// Base64 SPKI, vom Client beim Verbindungsaufbau mitgeschickt
    pub public_key: String,
    /// Client-Kennung (`x-oct-client`)
    pub client: String,
    pub raum: RoomId,
    pub kanal: PeerChannel,
}

impl Peer {
    pub fn senden(&self, nachricht: Message) -> RelayResult<()> {
        self.kanal.senden(nachricht)
    }

    /// Oeffentliche Sicht ohne Schluessel
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            host: self.host,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Oeffentliche Sicht inklusive Schluessel
    pub fn info_mit_schluessel(&self) -> PeerMitSchluessel {
        PeerMitSchluessel {
            peer: self.info(),
            public_key: self.public_key.clone(),
        }
    }
}
