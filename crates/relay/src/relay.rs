//! MessageRelay – Request-Korrelation und Broadcast-Verteilung
//!
//! ## Anfragen
//! Jede weitergeleitete Anfrage bekommt einen frischen, nicht erratbaren
//! Korrelationsschluessel. Der Eintrag in der Anfrage-Tabelle endet durch
//! genau eines von: Antwort, Zeitueberschreitung, Abbruch. Wer den Eintrag
//! aus der Tabelle entfernt hat gewonnen, alle anderen Pfade sehen
//! "bereits weg" und tun nichts.
//!
//! ## Broadcasts
//! Verteilung auf einem Schnappschuss der Peers. Verschluesselte Broadcasts
//! werden pro Empfaenger kopiert und tragen nur dessen Schluessel-Eintrag.
//! Fehler einzelner Empfaenger werden geloggt, der Broadcast selbst schlaegt
//! nie fehl.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::{mapref::entry::Entry, DashMap};
use oct_core::PeerId;
use oct_protocol::info::codes;
use oct_protocol::messages::{BroadcastMessage, RequestMessage};
use oct_protocol::{Message, NachrichtenId};
use rand_core::{OsRng, RngCore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{RelayError, RelayResult};
use crate::peer::Peer;
use crate::room::Room;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Timeout fuer weitergeleitete Anfragen
pub const STANDARD_TIMEOUT: Duration = Duration::from_secs(30);

/// 18 Zufallsbytes ergeben 24 Zeichen Base64url
const SCHLUESSEL_BYTES: usize = 18;

fn korrelationsschluessel() -> String {
    let mut bytes = [0u8; SCHLUESSEL_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Metrik-Hook
// ---------------------------------------------------------------------------

/// Zaehlpunkte des Relays, alle Methoden sind optional
pub trait RelayMetriken: Send + Sync {
    fn anfrage_weitergeleitet(&self) {}
    fn anfrage_zeitueberschreitung(&self) {}
    fn broadcast_verteilt(&self) {}
    fn schluessel_fehlt(&self) {}
}

struct KeineMetriken;

impl RelayMetriken for KeineMetriken {}

// ---------------------------------------------------------------------------
// Anfrage-Tabelle
// ---------------------------------------------------------------------------

/// Ausstehende weitergeleitete Anfrage
struct Ausstehend {
    /// Nur dieser Peer darf antworten
    ziel: PeerId,
    /// ID der urspruenglichen Anfrage, wird in die Antwort zurueckgeschrieben
    original_id: NachrichtenId,
    antwort: oneshot::Sender<Message>,
}

/// Entfernt den Tabelleneintrag beim Verlassen von `anfrage_senden`
///
/// Deckt Sendefehler und verworfene Futures ab. Mehrfaches Entfernen ist
/// ein No-Op.
struct Aufraeumen<'a> {
    anfragen: &'a DashMap<String, Ausstehend>,
    schluessel: String,
}

impl Drop for Aufraeumen<'_> {
    fn drop(&mut self) {
        self.anfragen.remove(&self.schluessel);
    }
}

/// Ergebnis einer Broadcast-Verteilung
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastBericht {
    pub zugestellt: Vec<PeerId>,
    /// Empfaenger ohne Schluessel-Eintrag (Fehler beim Absender)
    pub ohne_schluessel: Vec<PeerId>,
    pub fehlgeschlagen: Vec<PeerId>,
}

// ---------------------------------------------------------------------------
// MessageRelay
// ---------------------------------------------------------------------------

/// Relay fuer alle Raeume einer Server-Instanz
///
/// Clone teilt die Anfrage-Tabelle.
#[derive(Clone)]
pub struct MessageRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    anfragen: DashMap<String, Ausstehend>,
    timeout: Duration,
    metriken: Arc<dyn RelayMetriken>,
}

impl MessageRelay {
    pub fn neu(timeout: Duration, metriken: Arc<dyn RelayMetriken>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                anfragen: DashMap::new(),
                timeout,
                metriken,
            }),
        }
    }

    /// Anzahl ausstehender Anfragen
    pub fn ausstehend(&self) -> usize {
        self.inner.anfragen.len()
    }

    fn eintrag_anlegen(
        &self,
        ziel: PeerId,
        original_id: NachrichtenId,
        antwort: oneshot::Sender<Message>,
    ) -> String {
        loop {
            let schluessel = korrelationsschluessel();
            if let Entry::Vacant(frei) = self.inner.anfragen.entry(schluessel.clone()) {
                frei.insert(Ausstehend {
                    ziel,
                    original_id,
                    antwort,
                });
                return schluessel;
            }
        }
    }

    /// Leitet eine Anfrage an `ziel` weiter und wartet auf die Antwort
    ///
    /// Die Antwort traegt wieder die ID der urspruenglichen Anfrage.
    pub async fn anfrage_senden(
        &self,
        ziel: &Peer,
        anfrage: &RequestMessage,
        timeout: Option<Duration>,
    ) -> RelayResult<Message> {
        let dauer = timeout.unwrap_or(self.inner.timeout);
        let (tx, mut rx) = oneshot::channel();
        let schluessel = self.eintrag_anlegen(ziel.id, anfrage.id.clone(), tx);
        let _aufraeumen = Aufraeumen {
            anfragen: &self.inner.anfragen,
            schluessel: schluessel.clone(),
        };

        ziel.senden(Message::Request(anfrage.mit_id(schluessel.clone())))?;
        self.inner.metriken.anfrage_weitergeleitet();

        match tokio::time::timeout(dauer, &mut rx).await {
            Ok(Ok(antwort)) => Ok(antwort),
            Ok(Err(_)) => Err(RelayError::Abgebrochen { schluessel }),
            Err(_) => {
                if self.inner.anfragen.remove(&schluessel).is_some() {
                    tracing::debug!(
                        schluessel = %schluessel,
                        ziel = %ziel.id,
                        methode = %anfrage.method,
                        "Anfrage abgelaufen"
                    );
                    self.inner.metriken.anfrage_zeitueberschreitung();
                    Err(RelayError::RequestTimedOut { schluessel })
                } else {
                    // Antwort hat den Eintrag gerade entfernt und wird zugestellt
                    rx.await.map_err(|_| RelayError::Abgebrochen { schluessel })
                }
            }
        }
    }

    /// Ordnet eine Antwort ihrer wartenden Anfrage zu
    ///
    /// Unbekannte oder bereits abgelaufene Schluessel werden still verworfen.
    /// Gibt `true` zurueck wenn die Antwort zugestellt wurde.
    pub fn antwort_zustellen(&self, absender: &PeerId, nachricht: Message) -> bool {
        let schluessel = match &nachricht {
            Message::Response(r) => &r.id,
            Message::ResponseError(r) => &r.id,
            andere => {
                tracing::debug!(art = andere.art(), "Keine Antwort, ignoriert");
                return false;
            }
        };
        let NachrichtenId::Text(schluessel) = schluessel else {
            tracing::debug!(peer = %absender, "Antwort mit numerischer ID verworfen");
            return false;
        };

        let Some((_, eintrag)) = self
            .inner
            .anfragen
            .remove_if(schluessel, |_, e| e.ziel == *absender)
        else {
            tracing::debug!(peer = %absender, schluessel = %schluessel, "Antwort ohne wartende Anfrage verworfen");
            return false;
        };

        let antwort = match nachricht {
            Message::Response(mut r) => {
                r.id = eintrag.original_id;
                Message::Response(r)
            }
            Message::ResponseError(mut r) => {
                r.id = eintrag.original_id;
                Message::ResponseError(r)
            }
            andere => andere,
        };
        // Empfaenger kann bereits verworfen sein, dann ist nichts mehr zu tun
        eintrag.antwort.send(antwort).is_ok()
    }

    /// Sendet eine Benachrichtigung ohne Korrelation
    pub fn benachrichtigung_senden(&self, ziel: &Peer, nachricht: Message) -> RelayResult<()> {
        ziel.senden(nachricht)
    }

    /// Verteilt einen Broadcast an alle Peers des Raums ausser dem Absender
    pub fn broadcast_senden(
        &self,
        raum: &Room,
        origin: &Peer,
        nachricht: &BroadcastMessage,
    ) -> BroadcastBericht {
        let gestempelt = nachricht.mit_origin(origin.id);
        let verschluesselt = gestempelt.ist_verschluesselt();
        let mut bericht = BroadcastBericht::default();

        for peer in raum.schnappschuss() {
            if peer.id == origin.id {
                continue;
            }

            let kopie = if verschluesselt {
                match gestempelt.schluessel_fuer(&peer.id) {
                    Some(eintrag) => gestempelt.mit_einzelnem_schluessel(eintrag.clone()),
                    None => {
                        tracing::warn!(
                            raum = %raum.id,
                            origin = %origin.id,
                            peer = %peer.id,
                            methode = %gestempelt.method,
                            "Broadcast ohne Schluessel fuer Empfaenger, Peer uebersprungen"
                        );
                        self.inner.metriken.schluessel_fehlt();
                        bericht.ohne_schluessel.push(peer.id);
                        continue;
                    }
                }
            } else {
                gestempelt.clone()
            };

            match peer.senden(Message::Broadcast(kopie)) {
                Ok(()) => bericht.zugestellt.push(peer.id),
                Err(e) => {
                    tracing::warn!(raum = %raum.id, peer = %peer.id, fehler = %e, "Broadcast-Zustellung fehlgeschlagen");
                    bericht.fehlgeschlagen.push(peer.id);
                }
            }
        }

        self.inner.metriken.broadcast_verteilt();
        bericht
    }

    /// Verarbeitet eine eingehende Nachricht eines Peers
    ///
    /// Anfragen ohne `target` gehen an den Host. Die Antwort auf eine
    /// weitergeleitete Anfrage (oder ein `RequestTimedOut`-Fehler) wird
    /// asynchron an den Absender zurueckgeschickt.
    pub fn verarbeiten(&self, raum: &Arc<Room>, absender: &Arc<Peer>, nachricht: Message) {
        match nachricht {
            Message::Request(anfrage) => self.anfrage_weiterleiten(raum, absender, anfrage),
            antwort @ (Message::Response(_) | Message::ResponseError(_)) => {
                self.antwort_zustellen(&absender.id, antwort);
            }
            Message::Notification(notiz) => {
                let ziel = match notiz.target {
                    Some(id) => raum.peer(&id),
                    None => Some(Arc::clone(&raum.host)),
                };
                let Some(ziel) = ziel else {
                    tracing::debug!(raum = %raum.id, methode = %notiz.method, "Benachrichtigung an unbekannten Peer verworfen");
                    return;
                };
                let weiter = Message::Notification(notiz.mit_origin(absender.id));
                if let Err(e) = self.benachrichtigung_senden(&ziel, weiter) {
                    tracing::debug!(peer = %ziel.id, fehler = %e, "Benachrichtigung nicht zugestellt");
                }
            }
            Message::Broadcast(broadcast) => {
                self.broadcast_senden(raum, absender, &broadcast);
            }
        }
    }

    fn anfrage_weiterleiten(&self, raum: &Arc<Room>, absender: &Arc<Peer>, anfrage: RequestMessage) {
        let ziel = match anfrage.target {
            Some(id) => raum.peer(&id),
            None => Some(Arc::clone(&raum.host)),
        };
        let Some(ziel) = ziel else {
            let fehler = Message::response_error(
                anfrage.id.clone(),
                codes::PEER_NOT_FOUND,
                "Ziel-Peer ist nicht im Raum",
            );
            if let Err(e) = absender.senden(fehler) {
                tracing::debug!(peer = %absender.id, fehler = %e, "Fehlerantwort nicht zugestellt");
            }
            return;
        };

        let relay = self.clone();
        let absender = Arc::clone(absender);
        tokio::spawn(async move {
            let weiter = anfrage.mit_origin(absender.id);
            let antwort = match relay.anfrage_senden(&ziel, &weiter, None).await {
                Ok(antwort) => antwort,
                Err(RelayError::RequestTimedOut { .. }) => Message::response_error(
                    anfrage.id.clone(),
                    codes::REQUEST_TIMED_OUT,
                    "Anfrage abgelaufen",
                ),
                Err(e) => Message::response_error(
                    anfrage.id.clone(),
                    codes::PEER_NOT_FOUND,
                    e.to_string(),
                ),
            };
            if let Err(e) = absender.senden(antwort) {
                tracing::debug!(peer = %absender.id, fehler = %e, "Antwort nicht zugestellt");
            }
        });
    }

    /// Bricht alle ausstehenden Anfragen ab (Relay wird beendet)
    pub fn alle_abbrechen(&self) {
        let anzahl = self.inner.anfragen.len();
        self.inner.anfragen.clear();
        if anzahl > 0 {
            tracing::debug!(anzahl, "Ausstehende Anfragen abgebrochen");
        }
    }
}

impl Default for MessageRelay {
    fn default() -> Self {
        Self::neu(STANDARD_TIMEOUT, Arc::new(KeineMetriken))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerChannel;
    use oct_core::RoomId;
    use oct_protocol::messages::EncryptedKey;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn peer(raum: RoomId, name: &str, host: bool) -> (Arc<Peer>, mpsc::Receiver<Message>) {
        let id = PeerId::new();
        let (kanal, rx) = PeerChannel::neu(id);
        let peer = Peer {
            id,
            name: name.into(),
            email: None,
            host,
            public_key: format!("pk-{name}"),
            client: "test".into(),
            raum,
            kanal,
        };
        (Arc::new(peer), rx)
    }

    struct Aufbau {
        raum: Arc<Room>,
        a: Arc<Peer>,
        b: Arc<Peer>,
        c: Arc<Peer>,
        rx_a: mpsc::Receiver<Message>,
        rx_b: mpsc::Receiver<Message>,
        rx_c: mpsc::Receiver<Message>,
    }

    fn raum_abc() -> Aufbau {
        let raum_id = RoomId::new();
        let (a, rx_a) = peer(raum_id, "a", true);
        let (b, rx_b) = peer(raum_id, "b", false);
        let (c, rx_c) = peer(raum_id, "c", false);
        let raum = Arc::new(Room::neu(raum_id, Arc::clone(&a)));
        raum.hinzufuegen(Arc::clone(&b));
        raum.hinzufuegen(Arc::clone(&c));
        Aufbau { raum, a, b, c, rx_a, rx_b, rx_c }
    }

    fn schluessel(target: PeerId) -> EncryptedKey {
        EncryptedKey {
            target,
            key: format!("key-{target}"),
        }
    }

    fn verschluesselt(keys: Vec<EncryptedKey>) -> BroadcastMessage {
        let mut msg = BroadcastMessage::klartext("doc/update", vec![json!({"iv": "x", "data": "y"})]);
        msg.metadata.encryption.keys = keys;
        msg
    }

    fn als_broadcast(msg: Message) -> BroadcastMessage {
        match msg {
            Message::Broadcast(b) => b,
            andere => panic!("Erwartet Broadcast, erhalten {}", andere.art()),
        }
    }

    #[derive(Default)]
    struct Zaehler {
        zeitueberschreitungen: AtomicUsize,
        fehlende_schluessel: AtomicUsize,
    }

    impl RelayMetriken for Zaehler {
        fn anfrage_zeitueberschreitung(&self) {
            self.zeitueberschreitungen.fetch_add(1, Ordering::SeqCst);
        }
        fn schluessel_fehlt(&self) {
            self.fehlende_schluessel.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn verschluesselter_broadcast_nur_eigener_schluessel() {
        let mut t = raum_abc();
        let relay = MessageRelay::default();
        let msg = verschluesselt(vec![schluessel(t.b.id), schluessel(t.c.id)]);

        let bericht = relay.broadcast_senden(&t.raum, &t.a, &msg);
        assert_eq!(bericht.zugestellt.len(), 2);

        let fuer_b = als_broadcast(t.rx_b.try_recv().unwrap());
        assert_eq!(fuer_b.metadata.encryption.keys, vec![schluessel(t.b.id)]);
        assert_eq!(fuer_b.origin, Some(t.a.id));

        let fuer_c = als_broadcast(t.rx_c.try_recv().unwrap());
        assert_eq!(fuer_c.metadata.encryption.keys, vec![schluessel(t.c.id)]);

        assert!(t.rx_a.try_recv().is_err(), "Absender bekommt nichts");
        assert_eq!(msg.metadata.encryption.keys.len(), 2, "Original unveraendert");
        assert!(msg.origin.is_none());
    }

    #[test]
    fn fehlender_schluessel_ueberspringt_peer() {
        let mut t = raum_abc();
        let zaehler = Arc::new(Zaehler::default());
        let relay = MessageRelay::neu(STANDARD_TIMEOUT, zaehler.clone());
        let msg = verschluesselt(vec![schluessel(t.b.id)]);

        let bericht = relay.broadcast_senden(&t.raum, &t.a, &msg);
        assert_eq!(bericht.zugestellt, vec![t.b.id]);
        assert_eq!(bericht.ohne_schluessel, vec![t.c.id]);
        assert!(t.rx_b.try_recv().is_ok());
        assert!(t.rx_c.try_recv().is_err());
        assert_eq!(zaehler.fehlende_schluessel.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn klartext_broadcast_an_alle_ausser_absender() {
        let mut t = raum_abc();
        let relay = MessageRelay::default();
        let msg = BroadcastMessage::klartext("awareness", vec![json!(1)]);

        relay.broadcast_senden(&t.raum, &t.b, &msg);
        let fuer_a = als_broadcast(t.rx_a.try_recv().unwrap());
        let fuer_c = als_broadcast(t.rx_c.try_recv().unwrap());
        assert_eq!(fuer_a.params, vec![json!(1)]);
        assert_eq!(fuer_c.origin, Some(t.b.id));
        assert!(t.rx_b.try_recv().is_err());
    }

    #[test]
    fn geschlossener_empfaenger_stoppt_verteilung_nicht() {
        let t = raum_abc();
        let Aufbau { raum, a, b, c, rx_b, mut rx_c, .. } = t;
        drop(rx_b);
        let relay = MessageRelay::default();
        let bericht =
            relay.broadcast_senden(&raum, &a, &BroadcastMessage::klartext("x", vec![]));
        assert_eq!(bericht.fehlgeschlagen, vec![b.id]);
        assert_eq!(bericht.zugestellt, vec![c.id]);
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn verlassener_peer_nach_schnappschuss_bekommt_nichts() {
        let mut t = raum_abc();
        t.raum.entfernen(&t.c.id);
        let relay = MessageRelay::default();
        relay.broadcast_senden(&t.raum, &t.a, &BroadcastMessage::klartext("x", vec![]));
        assert!(t.rx_c.try_recv().is_err());
        assert!(t.rx_b.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn antwort_mit_original_id() {
        let Aufbau { a, mut rx_a, .. } = raum_abc();
        let relay = MessageRelay::default();
        let anfrage = RequestMessage {
            id: NachrichtenId::Zahl(5),
            method: "fs/read".into(),
            params: vec![],
            target: None,
            origin: None,
        };

        let relay2 = relay.clone();
        let host = a.id;
        let antworter = tokio::spawn(async move {
            let Some(Message::Request(r)) = rx_a.recv().await else {
                panic!("Erwartet Request");
            };
            assert!(matches!(&r.id, NachrichtenId::Text(s) if s.len() == 24));
            assert!(relay2.antwort_zustellen(&host, Message::response(r.id, json!("inhalt"))));
        });

        let antwort = relay.anfrage_senden(&a, &anfrage, None).await.unwrap();
        antworter.await.unwrap();
        assert_eq!(antwort, Message::response(5u64, json!("inhalt")));
        assert_eq!(relay.ausstehend(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn antwort_von_falschem_peer_wird_ignoriert() {
        let Aufbau { a, b, mut rx_a, .. } = raum_abc();
        let relay = MessageRelay::default();
        let anfrage = RequestMessage {
            id: 1u64.into(),
            method: "x".into(),
            params: vec![],
            target: None,
            origin: None,
        };
        let relay2 = relay.clone();
        let fremd = b.id;
        tokio::spawn(async move {
            if let Some(Message::Request(r)) = rx_a.recv().await {
                assert!(!relay2.antwort_zustellen(&fremd, Message::response(r.id, json!(null))));
            }
        });
        let e = relay
            .anfrage_senden(&a, &anfrage, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(e, RelayError::RequestTimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn zeitueberschreitung_und_spaete_antwort() {
        let mut t = raum_abc();
        let zaehler = Arc::new(Zaehler::default());
        let relay = MessageRelay::neu(Duration::from_secs(30), zaehler.clone());
        let anfrage = RequestMessage {
            id: 9u64.into(),
            method: "x".into(),
            params: vec![],
            target: None,
            origin: None,
        };

        let e = relay.anfrage_senden(&t.a, &anfrage, None).await.unwrap_err();
        assert!(matches!(e, RelayError::RequestTimedOut { .. }));
        assert_eq!(relay.ausstehend(), 0);
        assert_eq!(zaehler.zeitueberschreitungen.load(Ordering::SeqCst), 1);

        let Ok(Message::Request(r)) = t.rx_a.try_recv() else {
            panic!("Erwartet Request beim Host");
        };
        assert!(!relay.antwort_zustellen(&t.a.id, Message::response(r.id, json!(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn rennen_zwischen_antworten_und_timeout_genau_ein_ergebnis() {
        for _ in 0..20 {
            let Aufbau { a, mut rx_a, .. } = raum_abc();
            let relay = MessageRelay::default();
            let timeout = Duration::from_millis(50);
            let anfrage = RequestMessage {
                id: 1u64.into(),
                method: "x".into(),
                params: vec![],
                target: None,
                origin: None,
            };

            let zugestellt = Arc::new(AtomicUsize::new(0));
            let relay2 = relay.clone();
            let host = a.id;
            let z = Arc::clone(&zugestellt);
            let antworter = tokio::spawn(async move {
                let Some(Message::Request(r)) = rx_a.recv().await else {
                    panic!("Erwartet Request");
                };
                tokio::time::sleep(timeout).await;
                let mut handles = Vec::new();
                for _ in 0..2 {
                    let relay = relay2.clone();
                    let id = r.id.clone();
                    let z = Arc::clone(&z);
                    handles.push(tokio::spawn(async move {
                        if relay.antwort_zustellen(&host, Message::response(id, json!(1))) {
                            z.fetch_add(1, Ordering::SeqCst);
                        }
                    }));
                }
                for h in handles {
                    h.await.unwrap();
                }
            });

            let ergebnis = relay.anfrage_senden(&a, &anfrage, Some(timeout)).await;
            antworter.await.unwrap();

            let antworten = zugestellt.load(Ordering::SeqCst);
            match ergebnis {
                Ok(_) => assert_eq!(antworten, 1),
                Err(RelayError::RequestTimedOut { .. }) => assert_eq!(antworten, 0),
                Err(e) => panic!("Unerwarteter Fehler: {e}"),
            }
            assert_eq!(relay.ausstehend(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn verworfenes_future_raeumt_auf() {
        let t = raum_abc();
        let relay = MessageRelay::default();
        let anfrage = RequestMessage {
            id: 1u64.into(),
            method: "x".into(),
            params: vec![],
            target: None,
            origin: None,
        };
        let fut = relay.anfrage_senden(&t.a, &anfrage, None);
        let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert_eq!(relay.ausstehend(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abbrechen_beendet_wartende() {
        let t = raum_abc();
        let relay = MessageRelay::default();
        let relay2 = relay.clone();
        let a = Arc::clone(&t.a);
        let wartend = tokio::spawn(async move {
            let anfrage = RequestMessage {
                id: 1u64.into(),
                method: "x".into(),
                params: vec![],
                target: None,
                origin: None,
            };
            relay2.anfrage_senden(&a, &anfrage, None).await
        });
        tokio::task::yield_now().await;
        while relay.ausstehend() == 0 {
            tokio::task::yield_now().await;
        }
        relay.alle_abbrechen();
        let e = wartend.await.unwrap().unwrap_err();
        assert!(matches!(e, RelayError::Abgebrochen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_anfrage_wird_weitergeleitet_und_beantwortet() {
        let mut t = raum_abc();
        let relay = MessageRelay::default();

        let anfrage = Message::Request(RequestMessage {
            id: 3u64.into(),
            method: "editor/open".into(),
            params: vec![json!("a.rs")],
            target: Some(t.c.id),
            origin: None,
        });
        relay.verarbeiten(&t.raum, &t.b, anfrage);

        let Some(Message::Request(weiter)) = t.rx_c.recv().await else {
            panic!("Erwartet Request bei C");
        };
        assert_eq!(weiter.origin, Some(t.b.id));
        assert_ne!(weiter.id, NachrichtenId::Zahl(3));

        relay.verarbeiten(&t.raum, &t.c, Message::response(weiter.id, json!(true)));
        let antwort = t.rx_b.recv().await.unwrap();
        assert_eq!(antwort, Message::response(3u64, json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_anfrage_timeout_wird_als_fehler_gemeldet() {
        let mut t = raum_abc();
        let relay = MessageRelay::neu(Duration::from_secs(1), Arc::new(Zaehler::default()));
        relay.verarbeiten(&t.raum, &t.b, Message::request(4u64, "x", vec![]));

        let antwort = t.rx_b.recv().await.unwrap();
        let Message::ResponseError(e) = antwort else {
            panic!("Erwartet ResponseError");
        };
        assert_eq!(e.id, NachrichtenId::Zahl(4));
        assert_eq!(e.code, codes::REQUEST_TIMED_OUT);
        assert!(t.rx_a.try_recv().is_ok(), "Host hat die Anfrage gesehen");
    }

    #[tokio::test]
    async fn anfrage_an_unbekannten_peer() {
        let mut t = raum_abc();
        let relay = MessageRelay::default();
        let anfrage = RequestMessage {
            id: 8u64.into(),
            method: "x".into(),
            params: vec![],
            target: Some(PeerId::new()),
            origin: None,
        };
        relay.verarbeiten(&t.raum, &t.b, Message::Request(anfrage));
        let Ok(Message::ResponseError(e)) = t.rx_b.try_recv() else {
            panic!("Erwartet ResponseError");
        };
        assert_eq!(e.code, codes::PEER_NOT_FOUND);
    }

    #[test]
    fn korrelationsschluessel_format() {
        let a = korrelationsschluessel();
        assert_eq!(a.len(), 24);
        assert_ne!(a, korrelationsschluessel());
    }
}
