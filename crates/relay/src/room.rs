//! Raum: Host plus Menge verbundener Peers

use dashmap::DashMap;
use oct_core::{PeerId, RoomId};
use std::sync::Arc;

use crate::peer::Peer;

/// Ein Kollaborationsraum
///
/// Die Peer-Menge aendert sich bei Beitritt und Verlassen. Broadcasts
/// arbeiten auf einem Schnappschuss, siehe [`Room::schnappschuss`].
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub host: Arc<Peer>,
    peers: DashMap<PeerId, Arc<Peer>>,
}

impl Room {
    /// Erstellt einen Raum, der Host ist sofort Mitglied
    pub fn neu(id: RoomId, host: Arc<Peer>) -> Self {
        let peers = DashMap::new();
        peers.insert(host.id, Arc::clone(&host));
        Self { id, host, peers }
    }

    pub fn hinzufuegen(&self, peer: Arc<Peer>) {
        self.peers.insert(peer.id, peer);
    }

    pub fn entfernen(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.remove(peer_id).map(|(_, p)| p)
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.get(peer_id).map(|p| Arc::clone(p.value()))
    }

    /// Stabiler Schnappschuss aller Peers zum Zeitpunkt des Aufrufs
    pub fn schnappschuss(&self) -> Vec<Arc<Peer>> {
        self.peers.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Alle Peers ausser dem Host
    pub fn gaeste(&self) -> Vec<Arc<Peer>> {
        self.schnappschuss()
            .into_iter()
            .filter(|p| p.id != self.host.id)
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.peers.len()
    }
}
