//! Token-Verwaltung der Control-Plane
//!
//! Alle Tokens sind zufaellige, URL-sichere Strings mit Ablaufzeit und
//! liegen nur im Speicher:
//!
//! - Login-Poll-Token: offener Login bis `/api/login/simple` ihn abschliesst
//! - Login-Token: angemeldeter Benutzer (`x-oct-jwt` bzw. Cookie)
//! - Raum-Token: Zulassung fuer genau eine WebSocket-Verbindung zu einem Raum
//! - Beitritts-Poll-Token: wartet auf die Entscheidung des Hosts
//!
//! Ein Hintergrund-Task bereinigt abgelaufene Eintraege.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use oct_core::RoomId;
use oct_protocol::info::{codes, Info};
use oct_protocol::types::{JoinPollAntwort, JoinRoomPollResponse, JoinRoomResponse, User};
use rand_core::{OsRng, RngCore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::fehler::{ApiFehler, ApiResult};

/// Intervall fuer den automatischen Cleanup-Task
const CLEANUP_INTERVALL: Duration = Duration::from_secs(60);

/// Zulassung fuer eine WebSocket-Verbindung
#[derive(Debug, Clone)]
pub struct Zulassung {
    pub raum: RoomId,
    pub benutzer: User,
    pub host: bool,
    laeuft_ab_am: DateTime<Utc>,
}

/// Stand eines Beitritts aus Sicht des Servers
#[derive(Debug, Clone, PartialEq)]
pub enum BeitrittsStatus {
    Wartend,
    Zugelassen(JoinRoomResponse),
    Abgelehnt(Info),
}

struct OffenerLogin {
    token: watch::Sender<Option<String>>,
    laeuft_ab_am: DateTime<Utc>,
}

struct Anmeldung {
    benutzer: User,
    laeuft_ab_am: DateTime<Utc>,
}

struct OffenerBeitritt {
    raum: RoomId,
    status: watch::Sender<BeitrittsStatus>,
    /// Zwischenstand "wartet auf Host" wurde schon ausgeliefert
    gemeldet: AtomicBool,
    laeuft_ab_am: DateTime<Utc>,
}

/// In-Memory Token-Speicher mit TTL
pub struct SitzungsSpeicher {
    login_ttl: chrono::Duration,
    token_ttl: chrono::Duration,
    offene_logins: DashMap<String, OffenerLogin>,
    anmeldungen: DashMap<String, Anmeldung>,
    zulassungen: DashMap<String, Zulassung>,
    beitritte: DashMap<String, OffenerBeitritt>,
}

impl SitzungsSpeicher {
    pub fn neu(login_ttl_sekunden: i64, token_ttl_sekunden: i64) -> Arc<Self> {
        Arc::new(Self {
            login_ttl: chrono::Duration::seconds(login_ttl_sekunden),
            token_ttl: chrono::Duration::seconds(token_ttl_sekunden),
            offene_logins: DashMap::new(),
            anmeldungen: DashMap::new(),
            zulassungen: DashMap::new(),
            beitritte: DashMap::new(),
        })
    }

    /// Startet den Cleanup-Task fuer einen Speicher
    pub fn neu_mit_cleanup(speicher: Arc<Self>) -> Arc<Self> {
        let speicher_klon = Arc::clone(&speicher);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVALL).await;
                let entfernt = speicher_klon.cleanup_abgelaufene();
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Tokens bereinigt");
                }
            }
        });
        speicher
    }

    fn ablauf(&self) -> DateTime<Utc> {
        Utc::now() + self.token_ttl
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Legt einen offenen Login an und gibt dessen Poll-Token zurueck
    pub fn login_starten(&self) -> String {
        let poll_token = token_generieren();
        let (token, _) = watch::channel(None);
        self.offene_logins.insert(
            poll_token.clone(),
            OffenerLogin {
                token,
                laeuft_ab_am: self.ablauf(),
            },
        );
        poll_token
    }

    /// Schliesst einen offenen Login ab und stellt das Login-Token aus
    pub fn login_abschliessen(&self, poll_token: &str, benutzer: User) -> ApiResult<String> {
        let eintrag = self
            .offene_logins
            .get(poll_token)
            .filter(|e| e.laeuft_ab_am > Utc::now())
            .ok_or(ApiFehler::TokenNichtGefunden)?;

        let login_token = token_generieren();
        tracing::info!(benutzer = %benutzer.name, "Login abgeschlossen");
        self.anmeldungen.insert(
            login_token.clone(),
            Anmeldung {
                benutzer,
                laeuft_ab_am: Utc::now() + self.login_ttl,
            },
        );
        eintrag.token.send_replace(Some(login_token.clone()));
        Ok(login_token)
    }

    /// Wartet bis zu `halten` auf den Abschluss eines Logins
    ///
    /// `Ok(None)` heisst: noch nicht abgeschlossen.
    pub async fn login_pollen(&self, poll_token: &str, halten: Duration) -> ApiResult<Option<String>> {
        let mut rx = {
            let eintrag = self
                .offene_logins
                .get(poll_token)
                .filter(|e| e.laeuft_ab_am > Utc::now())
                .ok_or(ApiFehler::TokenNichtGefunden)?;
            eintrag.token.subscribe()
        };

        let token = match tokio::time::timeout(halten, rx.wait_for(Option::is_some)).await {
            Ok(Ok(token)) => token.clone(),
            _ => None,
        };
        if token.is_some() {
            self.offene_logins.remove(poll_token);
        }
        Ok(token)
    }

    /// Benutzer zu einem gueltigen Login-Token
    pub fn benutzer(&self, login_token: &str) -> Option<User> {
        self.anmeldungen
            .get(login_token)
            .filter(|a| a.laeuft_ab_am > Utc::now())
            .map(|a| a.benutzer.clone())
    }

    pub fn abmelden(&self, login_token: &str) {
        if self.anmeldungen.remove(login_token).is_some() {
            tracing::debug!("Login-Token invalidiert");
        }
    }

    // -----------------------------------------------------------------------
    // Raum-Zulassungen
    // -----------------------------------------------------------------------

    /// Stellt ein Raum-Token fuer eine WebSocket-Verbindung aus
    pub fn zulassung_ausstellen(&self, raum: RoomId, benutzer: User, host: bool) -> String {
        let token = token_generieren();
        self.zulassungen.insert(
            token.clone(),
            Zulassung {
                raum,
                benutzer,
                host,
                laeuft_ab_am: self.ablauf(),
            },
        );
        token
    }

    /// Loest ein Raum-Token ein (einmalig)
    pub fn zulassung_einloesen(&self, raum_token: &str) -> Option<Zulassung> {
        self.zulassungen
            .remove(raum_token)
            .map(|(_, z)| z)
            .filter(|z| z.laeuft_ab_am > Utc::now())
    }

    /// Verwirft alle Raum-Tokens und offenen Beitritte eines Raums
    pub fn raum_verwerfen(&self, raum: RoomId) {
        self.zulassungen.retain(|_, z| z.raum != raum);
        self.beitritte.retain(|_, b| {
            if b.raum == raum {
                b.status.send_if_modified(|s| {
                    if matches!(s, BeitrittsStatus::Wartend) {
                        *s = BeitrittsStatus::Abgelehnt(Info::neu(
                            codes::ROOM_NOT_FOUND,
                            "Raum wurde geschlossen",
                        ));
                        true
                    } else {
                        false
                    }
                });
            }
            true
        });
    }

    // -----------------------------------------------------------------------
    // Beitritte
    // -----------------------------------------------------------------------

    /// Legt einen offenen Beitritt an und gibt dessen Poll-Token zurueck
    pub fn beitritt_starten(&self, raum: RoomId) -> String {
        let poll_token = token_generieren();
        let (status, _) = watch::channel(BeitrittsStatus::Wartend);
        self.beitritte.insert(
            poll_token.clone(),
            OffenerBeitritt {
                raum,
                status,
                gemeldet: AtomicBool::new(false),
                laeuft_ab_am: self.ablauf(),
            },
        );
        poll_token
    }

    /// Setzt das Ergebnis eines Beitritts. Nur der erste Entscheid zaehlt.
    pub fn beitritt_entscheiden(&self, poll_token: &str, entscheid: BeitrittsStatus) -> bool {
        let Some(eintrag) = self.beitritte.get(poll_token) else {
            return false;
        };
        eintrag.status.send_if_modified(|s| {
            if matches!(s, BeitrittsStatus::Wartend) {
                *s = entscheid;
                true
            } else {
                false
            }
        })
    }

    /// Pollt einen Beitritt
    ///
    /// Der erste Poll liefert sofort "wartet auf Host". Danach wird bis zu
    /// `halten` auf den Entscheid gewartet; `Ok(None)` heisst: noch offen.
    pub async fn beitritt_pollen(
        &self,
        poll_token: &str,
        halten: Duration,
    ) -> ApiResult<Option<JoinPollAntwort>> {
        let mut rx = {
            let eintrag = self
                .beitritte
                .get(poll_token)
                .filter(|e| e.laeuft_ab_am > Utc::now())
                .ok_or(ApiFehler::TokenNichtGefunden)?;
            let wartend = matches!(*eintrag.status.borrow(), BeitrittsStatus::Wartend);
            if wartend && !eintrag.gemeldet.swap(true, Ordering::Relaxed) {
                return Ok(Some(JoinPollAntwort::Status(JoinRoomPollResponse {
                    info: Info::neu(codes::WAITING_FOR_HOST, "Warte auf Zustimmung des Hosts"),
                    failure: false,
                })));
            }
            eintrag.status.subscribe()
        };

        let entscheid = match tokio::time::timeout(
            halten,
            rx.wait_for(|s| !matches!(s, BeitrittsStatus::Wartend)),
        )
        .await
        {
            Ok(Ok(s)) => s.clone(),
            _ => return Ok(None),
        };

        self.beitritte.remove(poll_token);
        Ok(match entscheid {
            BeitrittsStatus::Zugelassen(antwort) => Some(JoinPollAntwort::Fertig(antwort)),
            BeitrittsStatus::Abgelehnt(info) => Some(JoinPollAntwort::Status(JoinRoomPollResponse {
                info,
                failure: true,
            })),
            BeitrittsStatus::Wartend => None,
        })
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Bereinigt abgelaufene Eintraege und gibt deren Anzahl zurueck
    pub fn cleanup_abgelaufene(&self) -> usize {
        let jetzt = Utc::now();
        // Zaehlt nur was `retain` entfernt
        let mut entfernt = 0;
        let mut behalten = |laeuft_ab_am: DateTime<Utc>| {
            let bleibt = laeuft_ab_am > jetzt;
            if !bleibt {
                entfernt += 1;
            }
            bleibt
        };

        self.offene_logins.retain(|_, e| behalten(e.laeuft_ab_am));
        self.anmeldungen.retain(|_, e| behalten(e.laeuft_ab_am));
        self.zulassungen.retain(|_, e| behalten(e.laeuft_ab_am));
        self.beitritte.retain(|_, e| behalten(e.laeuft_ab_am));

        entfernt
    }
}

/// Generiert ein kryptografisch sicheres Token (URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oct_protocol::types::{Peer, Workspace};

    fn anna() -> User {
        User {
            name: "Anna".into(),
            email: Some("anna@example.org".into()),
        }
    }

    fn speicher() -> Arc<SitzungsSpeicher> {
        SitzungsSpeicher::neu(3600, 600)
    }

    #[tokio::test]
    async fn login_ablauf() {
        let s = speicher();
        let poll = s.login_starten();
        assert_eq!(s.login_pollen(&poll, Duration::ZERO).await.unwrap(), None);

        let token = s.login_abschliessen(&poll, anna()).unwrap();
        assert_eq!(s.benutzer(&token), Some(anna()));
        assert_eq!(
            s.login_pollen(&poll, Duration::ZERO).await.unwrap(),
            Some(token.clone())
        );

        // Poll-Token ist nach der Auslieferung verbraucht
        assert!(matches!(
            s.login_pollen(&poll, Duration::ZERO).await,
            Err(ApiFehler::TokenNichtGefunden)
        ));

        s.abmelden(&token);
        assert_eq!(s.benutzer(&token), None);
    }

    #[tokio::test(start_paused = true)]
    async fn gehaltener_poll_wird_durch_abschluss_geweckt() {
        let s = speicher();
        let poll = s.login_starten();

        let s2 = Arc::clone(&s);
        let p2 = poll.clone();
        let warten = tokio::spawn(async move { s2.login_pollen(&p2, Duration::from_secs(30)).await });
        tokio::task::yield_now().await;

        let token = s.login_abschliessen(&poll, anna()).unwrap();
        assert_eq!(warten.await.unwrap().unwrap(), Some(token));
    }

    #[tokio::test]
    async fn unbekannter_login_poll() {
        let s = speicher();
        assert!(matches!(
            s.login_abschliessen("gibts-nicht", anna()),
            Err(ApiFehler::TokenNichtGefunden)
        ));
    }

    #[test]
    fn abgelaufenes_login_token() {
        let s = SitzungsSpeicher::neu(-1, 600);
        let poll = s.login_starten();
        let token = s.login_abschliessen(&poll, anna()).unwrap();
        assert_eq!(s.benutzer(&token), None);
        assert!(s.cleanup_abgelaufene() >= 1);
    }

    #[test]
    fn cleanup_waehrend_paralleler_inserts() {
        let s = SitzungsSpeicher::neu(600, -1);
        let schreiber = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    s.login_starten();
                }
            })
        };
        let mut entfernt = 0;
        while !schreiber.is_finished() {
            entfernt += s.cleanup_abgelaufene();
        }
        schreiber.join().unwrap();
        entfernt += s.cleanup_abgelaufene();
        assert_eq!(entfernt, 2000);
    }

    #[test]
    fn zulassung_ist_einmalig() {
        let s = speicher();
        let raum = RoomId::new();
        let token = s.zulassung_ausstellen(raum, anna(), true);
        let z = s.zulassung_einloesen(&token).unwrap();
        assert_eq!(z.raum, raum);
        assert!(z.host);
        assert!(s.zulassung_einloesen(&token).is_none());
    }

    #[tokio::test]
    async fn beitritt_meldet_erst_wartend_dann_ergebnis() {
        let s = speicher();
        let raum = RoomId::new();
        let poll = s.beitritt_starten(raum);

        let erster = s.beitritt_pollen(&poll, Duration::ZERO).await.unwrap();
        assert!(matches!(
            erster,
            Some(JoinPollAntwort::Status(ref st)) if st.info.code == codes::WAITING_FOR_HOST && !st.failure
        ));
        assert_eq!(s.beitritt_pollen(&poll, Duration::ZERO).await.unwrap(), None);

        let antwort = JoinRoomResponse {
            room_id: raum,
            room_token: "R".into(),
            workspace: Workspace::default(),
            host: Peer {
                id: oct_core::PeerId::new(),
                host: true,
                name: "Host".into(),
                email: None,
            },
            login_token: None,
        };
        assert!(s.beitritt_entscheiden(&poll, BeitrittsStatus::Zugelassen(antwort.clone())));
        assert!(!s.beitritt_entscheiden(
            &poll,
            BeitrittsStatus::Abgelehnt(Info::neu(codes::JOIN_REJECTED, "zu spaet"))
        ));

        assert_eq!(
            s.beitritt_pollen(&poll, Duration::ZERO).await.unwrap(),
            Some(JoinPollAntwort::Fertig(antwort))
        );
    }

    #[tokio::test]
    async fn geschlossener_raum_lehnt_offene_beitritte_ab() {
        let s = speicher();
        let raum = RoomId::new();
        let poll = s.beitritt_starten(raum);
        let token = s.zulassung_ausstellen(raum, anna(), false);
        s.beitritt_pollen(&poll, Duration::ZERO).await.unwrap();

        s.raum_verwerfen(raum);

        assert!(s.zulassung_einloesen(&token).is_none());
        let antwort = s.beitritt_pollen(&poll, Duration::ZERO).await.unwrap();
        assert!(matches!(
            antwort,
            Some(JoinPollAntwort::Status(ref st)) if st.failure && st.info.code == codes::ROOM_NOT_FOUND
        ));
    }
}
