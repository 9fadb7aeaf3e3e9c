//! RoomManager – Lebenszyklus von Raeumen und Peers
//!
//! Ein Raum entsteht wenn sich sein Host ueber den Transport verbindet und
//! endet wenn der Host ihn verlaesst. Zustandsaenderungen werden an die
//! betroffenen Peers gemeldet (`peer/info`, `room/joined`, `room/left`,
//! `room/closed`) und an registrierte Beobachter verteilt.

use dashmap::DashMap;
use oct_core::{BeobachterRegistry, RoomId};
use oct_protocol::messages::methoden;
use oct_protocol::types::{Peer as PeerInfo, PeerInit};
use oct_protocol::Message;
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::peer::Peer;
use crate::relay::MessageRelay;
use crate::room::Room;

/// Ereignisse der Raumverwaltung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaumEreignis {
    PeerBeigetreten { raum: RoomId, peer: PeerInfo },
    PeerVerlassen { raum: RoomId, peer: PeerInfo },
    RaumGeschlossen { raum: RoomId },
}

/// Verwaltung aller Raeume einer Server-Instanz
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<RoomManagerInner>,
}

struct RoomManagerInner {
    raeume: DashMap<RoomId, Arc<Room>>,
    relay: MessageRelay,
    beobachter: BeobachterRegistry<RaumEreignis>,
}

impl RoomManager {
    pub fn neu(relay: MessageRelay) -> Self {
        Self {
            inner: Arc::new(RoomManagerInner {
                raeume: DashMap::new(),
                relay,
                beobachter: BeobachterRegistry::neu(),
            }),
        }
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.inner.relay
    }

    /// Registry fuer Raum-Ereignisse
    pub fn beobachter(&self) -> &BeobachterRegistry<RaumEreignis> {
        &self.inner.beobachter
    }

    pub fn raum(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.inner.raeume.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn anzahl_raeume(&self) -> usize {
        self.inner.raeume.len()
    }

    pub fn anzahl_peers(&self) -> usize {
        self.inner.raeume.iter().map(|r| r.anzahl()).sum()
    }

    /// Eroeffnet einen Raum mit seinem (gerade verbundenen) Host
    pub fn eroeffnen(&self, id: RoomId, host: Arc<Peer>) -> RelayResult<Arc<Room>> {
        let raum = match self.inner.raeume.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RelayError::RaumExistiert(id));
            }
            dashmap::mapref::entry::Entry::Vacant(frei) => {
                let raum = Arc::new(Room::neu(id, Arc::clone(&host)));
                frei.insert(Arc::clone(&raum));
                raum
            }
        };

        tracing::info!(raum = %id, host = %host.id, client = %host.client, "Raum eroeffnet");
        self.peer_info_senden(&raum, &host);
        self.inner.beobachter.verteilen(&RaumEreignis::PeerBeigetreten {
            raum: id,
            peer: host.info(),
        });
        Ok(raum)
    }

    /// Fuegt einen Gast einem bestehenden Raum hinzu
    pub fn beitreten(&self, id: RoomId, peer: Arc<Peer>) -> RelayResult<Arc<Room>> {
        let raum = self.raum(&id).ok_or(RelayError::RaumNichtGefunden(id))?;
        self.aufnehmen(&raum, &peer)?;

        tracing::info!(raum = %id, peer = %peer.id, name = %peer.name, "Peer beigetreten");
        self.peer_info_senden(&raum, &peer);

        let beigetreten = Message::notification(
            methoden::ROOM_JOINED,
            vec![serde_json::to_value(peer.info_mit_schluessel()).unwrap_or_default()],
        );
        self.an_andere(&raum, &peer, &beigetreten);

        self.inner.beobachter.verteilen(&RaumEreignis::PeerBeigetreten {
            raum: id,
            peer: peer.info(),
        });
        Ok(raum)
    }

    /// Fuegt den Peer hinzu, solange der Raum noch registriert ist
    ///
    /// `schliessen` entfernt den Raum vor dem Schnappschuss fuer `room/closed`.
    /// Ist er nach dem Einfuegen nicht mehr registriert, wird der Peer wieder
    /// entfernt.
    fn aufnehmen(&self, raum: &Arc<Room>, peer: &Arc<Peer>) -> RelayResult<()> {
        raum.hinzufuegen(Arc::clone(peer));
        let registriert = self
            .inner
            .raeume
            .get(&raum.id)
            .is_some_and(|r| Arc::ptr_eq(r.value(), raum));
        if !registriert {
            raum.entfernen(&peer.id);
            tracing::debug!(raum = %raum.id, peer = %peer.id, "Raum waehrend des Beitritts geschlossen");
            return Err(RelayError::RaumNichtGefunden(raum.id));
        }
        Ok(())
    }

    /// Entfernt einen Peer. Verlaesst der Host den Raum, wird er geschlossen.
    pub fn verlassen(&self, peer: &Peer) {
        let Some(raum) = self.raum(&peer.raum) else {
            return;
        };
        if raum.entfernen(&peer.id).is_none() {
            return;
        }

        tracing::info!(raum = %raum.id, peer = %peer.id, "Peer hat Raum verlassen");
        self.inner.beobachter.verteilen(&RaumEreignis::PeerVerlassen {
            raum: raum.id,
            peer: peer.info(),
        });

        if peer.id == raum.host.id {
            self.schliessen(&raum);
        } else {
            let verlassen = Message::notification(
                methoden::ROOM_LEFT,
                vec![serde_json::to_value(peer.info()).unwrap_or_default()],
            );
            self.an_andere(&raum, peer, &verlassen);
        }
    }

    fn schliessen(&self, raum: &Room) {
        self.inner.raeume.remove(&raum.id);
        let geschlossen = Message::notification(methoden::ROOM_CLOSED, vec![]);
        for peer in raum.schnappschuss() {
            if let Err(e) = self.inner.relay.benachrichtigung_senden(&peer, geschlossen.clone()) {
                tracing::debug!(peer = %peer.id, fehler = %e, "room/closed nicht zugestellt");
            }
        }
        tracing::info!(raum = %raum.id, "Raum geschlossen");
        self.inner
            .beobachter
            .verteilen(&RaumEreignis::RaumGeschlossen { raum: raum.id });
    }

    fn peer_info_senden(&self, raum: &Room, peer: &Peer) {
        let init = PeerInit {
            selbst: peer.info(),
            host: raum.host.info_mit_schluessel(),
            guests: raum
                .gaeste()
                .iter()
                .filter(|g| g.id != peer.id)
                .map(|g| g.info_mit_schluessel())
                .collect(),
        };
        let nachricht = Message::notification(
            methoden::PEER_INFO,
            vec![serde_json::to_value(init).unwrap_or_default()],
        );
        if let Err(e) = self.inner.relay.benachrichtigung_senden(peer, nachricht) {
            tracing::warn!(peer = %peer.id, fehler = %e, "peer/info nicht zugestellt");
        }
    }

    fn an_andere(&self, raum: &Room, ausser: &Peer, nachricht: &Message) {
        for peer in raum.schnappschuss() {
            if peer.id == ausser.id {
                continue;
            }
            if let Err(e) = self.inner.relay.benachrichtigung_senden(&peer, nachricht.clone()) {
                tracing::debug!(peer = %peer.id, fehler = %e, "Raum-Benachrichtigung nicht zugestellt");
            }
        }
    }
}
