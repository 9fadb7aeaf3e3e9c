//! ProtocolConnection – Client-Seite einer Raumverbindung
//!
//! Haelt den Transport, das Schluessel-Paar dieser Verbindung und die
//! oeffentlichen Schluessel der anderen Peers. Broadcasts werden hybrid
//! fuer alle bekannten Peers verschluesselt, eingehende Broadcasts mit dem
//! eigenen privaten Schluessel entschluesselt.
//!
//! Peer-Schluessel werden aus `peer/info` und `room/joined` gelernt und bei
//! `room/left` vergessen.

use dashmap::DashMap;
use oct_core::PeerId;
use oct_crypto::{broadcast_entschluesseln, broadcast_verschluesseln, CryptoProvider, Empfaenger, KeyPair, SecretString};
use oct_protocol::messages::{methoden, NotificationMessage, RequestMessage};
use oct_protocol::types::{Peer as PeerInfo, PeerInit, PeerMitSchluessel};
use oct_protocol::{BroadcastMessage, Message, MessageTransport, NachrichtenId, TransportError, TransportVerbindung};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{HandshakeError, HandshakeResult};

/// Groesse der Ereignis-Queue
const EREIGNIS_QUEUE_GROESSE: usize = 256;

/// Eingehende Ereignisse einer Verbindung
#[derive(Debug, Clone, PartialEq)]
pub enum VerbindungsEreignis {
    /// Anfrage eines anderen Peers, Antwort ueber [`ProtocolConnection::antworten`]
    Anfrage {
        id: NachrichtenId,
        origin: Option<PeerId>,
        method: String,
        params: Vec<Value>,
    },
    Benachrichtigung {
        origin: Option<PeerId>,
        method: String,
        params: Vec<Value>,
    },
    /// Broadcast mit bereits entschluesselten Parametern
    Broadcast {
        origin: Option<PeerId>,
        method: String,
        params: Vec<Value>,
    },
    PeerInfo(PeerInit),
    PeerBeigetreten(PeerMitSchluessel),
    PeerVerlassen(PeerInfo),
    RaumGeschlossen,
    Getrennt,
}

struct VerbindungInner {
    transport: Box<dyn MessageTransport>,
    schluessel: KeyPair,
    crypto: CryptoProvider,
    eigene_id: RwLock<Option<PeerId>>,
    host: RwLock<Option<PeerInfo>>,
    peer_schluessel: DashMap<PeerId, String>,
    ausstehend: DashMap<u64, oneshot::Sender<Message>>,
    naechste_id: AtomicU64,
    timeout: Duration,
}

/// Verbindung zu einem Raum
pub struct ProtocolConnection {
    inner: Arc<VerbindungInner>,
    ereignisse: Mutex<Option<mpsc::Receiver<VerbindungsEreignis>>>,
    empfaenger: JoinHandle<()>,
}

impl ProtocolConnection {
    /// Verbindet den geoeffneten Transport mit der Protokoll-Logik
    pub fn neu(
        verbindung: TransportVerbindung,
        schluessel: KeyPair,
        crypto: CryptoProvider,
        host: Option<PeerInfo>,
        timeout: Duration,
    ) -> Self {
        let TransportVerbindung { transport, mut eingang } = verbindung;
        let inner = Arc::new(VerbindungInner {
            transport,
            schluessel,
            crypto,
            eigene_id: RwLock::new(None),
            host: RwLock::new(host),
            peer_schluessel: DashMap::new(),
            ausstehend: DashMap::new(),
            naechste_id: AtomicU64::new(1),
            timeout,
        });

        let (tx, rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
        let empfaenger_inner = Arc::clone(&inner);
        let empfaenger = tokio::spawn(async move {
            // Antworten werden immer zugestellt, auch bei voller Ereignis-Queue
            while let Some(nachricht) = eingang.recv().await {
                if let Some(ereignis) = empfaenger_inner.verarbeiten(nachricht) {
                    ereignis_einreihen(&tx, ereignis);
                }
            }
            // Wartende Anfragen schlagen mit "Transport geschlossen" fehl
            empfaenger_inner.ausstehend.clear();
            ereignis_einreihen(&tx, VerbindungsEreignis::Getrennt);
            tracing::debug!("Verbindung getrennt");
        });

        Self {
            inner,
            ereignisse: Mutex::new(Some(rx)),
            empfaenger,
        }
    }

    /// Ereignis-Strom (kann genau einmal entnommen werden)
    pub fn ereignisse(&self) -> Option<mpsc::Receiver<VerbindungsEreignis>> {
        self.ereignisse.lock().take()
    }

    /// Privater Schluessel dieser Verbindung (Base64 PKCS#8)
    pub fn private_key(&self) -> &SecretString {
        &self.inner.schluessel.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.inner.schluessel.public_key
    }

    /// Eigene Peer-ID, bekannt ab `peer/info`
    pub fn eigene_id(&self) -> Option<PeerId> {
        *self.inner.eigene_id.read()
    }

    pub fn host(&self) -> Option<PeerInfo> {
        self.inner.host.read().clone()
    }

    /// Peers deren oeffentlicher Schluessel bekannt ist
    pub fn bekannte_peers(&self) -> Vec<PeerId> {
        self.inner.peer_schluessel.iter().map(|e| *e.key()).collect()
    }

    /// Sendet eine Anfrage (ohne `target` an den Host) und wartet auf die Antwort
    pub async fn anfrage_senden(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
        target: Option<PeerId>,
    ) -> HandshakeResult<Value> {
        let id = self.inner.naechste_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.ausstehend.insert(id, tx);

        let anfrage = Message::Request(RequestMessage {
            id: NachrichtenId::Zahl(id),
            method: method.into(),
            params,
            target,
            origin: None,
        });
        if let Err(e) = self.inner.transport.senden(anfrage).await {
            self.inner.ausstehend.remove(&id);
            return Err(e.into());
        }

        let ergebnis = tokio::time::timeout(self.inner.timeout, rx).await;
        self.inner.ausstehend.remove(&id);

        match ergebnis {
            Err(_) => Err(HandshakeError::RequestTimedOut),
            Ok(Err(_)) => Err(TransportError::Geschlossen.into()),
            Ok(Ok(Message::Response(r))) => Ok(r.result),
            Ok(Ok(Message::ResponseError(e))) => Err(HandshakeError::ServerError {
                code: e.code,
                message: e.message,
                params: e.params,
            }),
            Ok(Ok(andere)) => Err(HandshakeError::InvalidServerResponse(format!(
                "Unerwartete Antwort: {}",
                andere.art()
            ))),
        }
    }

    pub async fn benachrichtigung_senden(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
        target: Option<PeerId>,
    ) -> HandshakeResult<()> {
        let nachricht = Message::Notification(NotificationMessage {
            method: method.into(),
            params,
            target,
            origin: None,
        });
        Ok(self.inner.transport.senden(nachricht).await?)
    }

    /// Sendet einen fuer alle bekannten Peers verschluesselten Broadcast
    ///
    /// Ohne bekannte Empfaenger wird nichts gesendet.
    pub async fn broadcast_senden(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> HandshakeResult<()> {
        let eigene = self.eigene_id();
        let empfaenger: Vec<Empfaenger> = self
            .inner
            .peer_schluessel
            .iter()
            .filter(|e| Some(*e.key()) != eigene)
            .map(|e| Empfaenger {
                peer: *e.key(),
                public_key: e.value().clone(),
            })
            .collect();

        let method = method.into();
        if empfaenger.is_empty() {
            tracing::debug!(methode = %method, "Keine Empfaenger fuer Broadcast");
            return Ok(());
        }

        let broadcast = broadcast_verschluesseln(&self.inner.crypto, method, &params, &empfaenger)?;
        Ok(self.inner.transport.senden(Message::Broadcast(broadcast)).await?)
    }

    /// Sendet einen unverschluesselten Broadcast
    pub async fn klartext_broadcast_senden(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> HandshakeResult<()> {
        let broadcast = BroadcastMessage::klartext(method, params);
        Ok(self.inner.transport.senden(Message::Broadcast(broadcast)).await?)
    }

    /// Beantwortet eine eingegangene Anfrage
    pub async fn antworten(&self, id: NachrichtenId, result: Value) -> HandshakeResult<()> {
        Ok(self.inner.transport.senden(Message::response(id, result)).await?)
    }

    pub async fn fehler_antworten(
        &self,
        id: NachrichtenId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> HandshakeResult<()> {
        Ok(self
            .inner
            .transport
            .senden(Message::response_error(id, code, message))
            .await?)
    }

    /// Schliesst den Transport
    pub async fn schliessen(&self) {
        self.inner.transport.schliessen().await;
        self.empfaenger.abort();
        self.inner.ausstehend.clear();
    }
}

/// Reiht ein Ereignis ein ohne zu blockieren, bei voller Queue wird es verworfen
fn ereignis_einreihen(tx: &mpsc::Sender<VerbindungsEreignis>, ereignis: VerbindungsEreignis) {
    match tx.try_send(ereignis) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(ereignis)) => {
            tracing::warn!(ereignis = ?ereignis, "Ereignis-Queue voll, Ereignis verworfen");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::trace!("Ereignis-Empfaenger verworfen");
        }
    }
}

impl Drop for ProtocolConnection {
    fn drop(&mut self) {
        self.empfaenger.abort();
    }
}

impl VerbindungInner {
    fn verarbeiten(&self, nachricht: Message) -> Option<VerbindungsEreignis> {
        match nachricht {
            Message::Response(ref r) => {
                self.antwort_zustellen(&r.id, nachricht.clone());
                None
            }
            Message::ResponseError(ref r) => {
                self.antwort_zustellen(&r.id, nachricht.clone());
                None
            }
            Message::Request(r) => Some(VerbindungsEreignis::Anfrage {
                id: r.id,
                origin: r.origin,
                method: r.method,
                params: r.params,
            }),
            Message::Notification(n) => self.benachrichtigung(n),
            Message::Broadcast(b) => self.broadcast(b),
        }
    }

    fn antwort_zustellen(&self, id: &NachrichtenId, nachricht: Message) {
        let NachrichtenId::Zahl(n) = id else {
            tracing::debug!(id = %id, "Antwort mit unbekannter ID verworfen");
            return;
        };
        match self.ausstehend.remove(n) {
            Some((_, tx)) => {
                let _ = tx.send(nachricht);
            }
            None => tracing::debug!(id = n, "Antwort ohne wartende Anfrage verworfen"),
        }
    }

    fn benachrichtigung(&self, n: NotificationMessage) -> Option<VerbindungsEreignis> {
        let erster = n.params.first().cloned().unwrap_or(Value::Null);
        match n.method.as_str() {
            methoden::PEER_INFO => {
                let init: PeerInit = self.parsen(&n.method, erster)?;
                *self.eigene_id.write() = Some(init.selbst.id);
                *self.host.write() = Some(init.host.peer.clone());
                self.peer_schluessel
                    .insert(init.host.peer.id, init.host.public_key.clone());
                for gast in &init.guests {
                    self.peer_schluessel.insert(gast.peer.id, gast.public_key.clone());
                }
                Some(VerbindungsEreignis::PeerInfo(init))
            }
            methoden::ROOM_JOINED => {
                let peer: PeerMitSchluessel = self.parsen(&n.method, erster)?;
                self.peer_schluessel.insert(peer.peer.id, peer.public_key.clone());
                Some(VerbindungsEreignis::PeerBeigetreten(peer))
            }
            methoden::ROOM_LEFT => {
                let peer: PeerInfo = self.parsen(&n.method, erster)?;
                self.peer_schluessel.remove(&peer.id);
                Some(VerbindungsEreignis::PeerVerlassen(peer))
            }
            methoden::ROOM_CLOSED => Some(VerbindungsEreignis::RaumGeschlossen),
            _ => Some(VerbindungsEreignis::Benachrichtigung {
                origin: n.origin,
                method: n.method,
                params: n.params,
            }),
        }
    }

    fn parsen<T: serde::de::DeserializeOwned>(&self, methode: &str, wert: Value) -> Option<T> {
        match serde_json::from_value(wert) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(methode, fehler = %e, "Ungueltige Server-Benachrichtigung");
                None
            }
        }
    }

    fn broadcast(&self, b: BroadcastMessage) -> Option<VerbindungsEreignis> {
        let params = if b.ist_verschluesselt() {
            let Some(eigene_id) = *self.eigene_id.read() else {
                tracing::warn!(methode = %b.method, "Verschluesselter Broadcast vor peer/info verworfen");
                return None;
            };
            match broadcast_entschluesseln(
                &self.crypto,
                &b,
                &eigene_id,
                self.schluessel.private_key.expose(),
            ) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(methode = %b.method, fehler = %e, "Broadcast nicht entschluesselbar");
                    return None;
                }
            }
        } else {
            b.params
        };
        Some(VerbindungsEreignis::Broadcast {
            origin: b.origin,
            method: b.method,
            params,
        })
    }
}
