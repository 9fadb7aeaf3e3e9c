//! Sitzungsaufbau (ConnectionProvider)
//!
//! Login und Raum-Beitritt laufen jeweils als Token-Ausgabe mit
//! anschliessendem Polling:
//!
//! ```text
//! Initiiert -> Polling -> { Erfolgreich | Fehlgeschlagen | Abgebrochen }
//!                ^  |
//!                +--+ (noch nicht bereit)
//! ```
//!
//! Jeder Netzwerkaufruf laeuft gegen das Abbruch-Signal des Vorgangs. Wird
//! abgebrochen, wird der laufende Aufruf verworfen und kein weiterer Poll
//! gestartet. Das Polling ist unbegrenzt bis zum Abbruch, die Pause
//! zwischen zwei Polls ist `poll_intervall`.
//!
//! Die Zugangsdaten (Login-Token) gehoeren genau einer
//! `ConnectionProvider`-Instanz.

use async_trait::async_trait;
use oct_core::RoomId;
use oct_crypto::{CryptoError, CryptoProvider};
use oct_protocol::info::{codes, Info};
use oct_protocol::transport::header;
use oct_protocol::types::{
    AuthMetadata, CreateRoomResponse, JoinPollAntwort, JoinRoomInitialResponse, JoinRoomResponse,
    LoginInitialResponse, LoginPollResponse, LoginValidateResponse, Peer, ProtocolServerMetaData,
};
use oct_protocol::{kompatibel, protokoll_version, TransportProvider};
use parking_lot::RwLock;
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::abbruch;
use crate::connection::ProtocolConnection;
use crate::error::{HandshakeError, HandshakeResult};
use crate::fetch::{FetchAnfrage, FetchAntwort, HttpFetch};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Client-Kennung wenn keine gesetzt ist
pub const STANDARD_CLIENT: &str = "Unbekannter OCT Rust Client";

/// Mindestpause nach einem Netzwerkfehler waehrend des Pollings
const FEHLER_PAUSE: Duration = Duration::from_secs(1);

/// Startet die eigentliche Authentifizierung (z.B. Browser mit Login-Seite oeffnen)
///
/// `Ok(false)` oder ein Fehler bricht das Login-Polling ab.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn authentifizieren(
        &self,
        poll_token: String,
        metadaten: AuthMetadata,
    ) -> HandshakeResult<bool>;
}

/// Empfaenger von Fortschritts- und Fehlermeldungen
pub type Reporter = Arc<dyn Fn(&Info) + Send + Sync>;

/// Abbruch-Signal und Reporter eines Vorgangs
#[derive(Clone, Default)]
pub struct VorgangsOptionen {
    pub abbruch: CancellationToken,
    pub reporter: Option<Reporter>,
}

impl VorgangsOptionen {
    pub fn neu(abbruch: CancellationToken) -> Self {
        Self {
            abbruch,
            reporter: None,
        }
    }

    pub fn mit_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    fn melden(&self, info: &Info) {
        if let Some(reporter) = &self.reporter {
            reporter(info);
        }
    }

    /// Meldet einen Fehlschlag ueber den Reporter bevor er zurueckgegeben wird
    fn abschliessen<T>(&self, ergebnis: HandshakeResult<T>) -> HandshakeResult<T> {
        if let Err(e) = &ergebnis {
            self.melden(&e.info());
        }
        ergebnis
    }
}

/// Konfiguration eines [`ConnectionProvider`]
pub struct ConnectionProviderOptions {
    /// Basis-URL des Servers
    pub url: String,
    /// Bereits vorhandenes Login-Token
    pub user_token: Option<String>,
    /// Client-Kennung fuer `x-oct-client`
    pub client: Option<String>,
    /// Abweichende Protokollversion (Standard: die dieses Builds)
    pub protocol_version: Option<String>,
    /// Server-verwaltete Cookies statt Bearer-Token
    pub use_cookie_auth: bool,
    pub fetch: Arc<dyn HttpFetch>,
    pub auth_handler: Arc<dyn AuthHandler>,
    /// Transporte in Praeferenzreihenfolge
    pub transports: Vec<Arc<dyn TransportProvider>>,
    pub poll_intervall: Duration,
    /// Timeout fuer Anfragen ueber die aufgebaute Verbindung
    pub anfrage_timeout: Duration,
    pub crypto: CryptoProvider,
}

impl ConnectionProviderOptions {
    /// Optionen mit Standardwerten, Krypto ueber das globale Backend
    pub fn neu(
        url: impl Into<String>,
        fetch: Arc<dyn HttpFetch>,
        auth_handler: Arc<dyn AuthHandler>,
    ) -> Self {
        Self {
            url: url.into(),
            user_token: None,
            client: None,
            protocol_version: None,
            use_cookie_auth: false,
            fetch,
            auth_handler,
            transports: Vec::new(),
            poll_intervall: Duration::ZERO,
            anfrage_timeout: Duration::from_secs(30),
            crypto: CryptoProvider::global(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionProvider
// ---------------------------------------------------------------------------

pub struct ConnectionProvider {
    optionen: ConnectionProviderOptions,
    protokoll_version: Version,
    user_token: RwLock<Option<String>>,
}

impl ConnectionProvider {
    pub fn neu(optionen: ConnectionProviderOptions) -> HandshakeResult<Self> {
        let protokoll_version = match &optionen.protocol_version {
            Some(v) => Version::parse(v).map_err(|_| {
                HandshakeError::Konfiguration(format!("Ungueltige Protokollversion: {v}"))
            })?,
            None => protokoll_version(),
        };
        let user_token = RwLock::new(optionen.user_token.clone());
        Ok(Self {
            optionen,
            protokoll_version,
            user_token,
        })
    }

    /// Aktuelles Login-Token
    pub fn auth_token(&self) -> Option<String> {
        self.user_token.read().clone()
    }

    fn basis_url(&self) -> &str {
        self.optionen.url.trim_end_matches('/')
    }

    fn url(&self, pfad: &str) -> String {
        format!("{}/{}", self.basis_url(), pfad.trim_start_matches('/'))
    }

    fn auth_header(&self) -> HandshakeResult<Vec<(String, String)>> {
        if self.optionen.use_cookie_auth {
            return Ok(Vec::new());
        }
        match self.user_token.read().as_ref() {
            Some(token) => Ok(vec![(header::JWT.to_string(), token.clone())]),
            None => Err(HandshakeError::NoAuthToken),
        }
    }

    fn authentifiziert(&self) -> HandshakeResult<FetchAnfrage> {
        Ok(FetchAnfrage::post()
            .headers(self.auth_header()?)
            .cookies(self.optionen.use_cookie_auth))
    }

    /// Fuehrt einen Aufruf aus, verwirft ihn bei Abbruch
    async fn abrufen(
        &self,
        abbruch: &CancellationToken,
        pfad: &str,
        anfrage: FetchAnfrage,
    ) -> HandshakeResult<FetchAntwort> {
        let url = self.url(pfad);
        tokio::select! {
            biased;
            _ = abbruch.cancelled() => Err(HandshakeError::Cancelled),
            antwort = self.optionen.fetch.fetch(&url, anfrage) => antwort,
        }
    }

    async fn warten(&self, abbruch: &CancellationToken, dauer: Duration) -> HandshakeResult<()> {
        if dauer.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = abbruch.cancelled() => Err(HandshakeError::Cancelled),
            _ = tokio::time::sleep(dauer) => Ok(()),
        }
    }

    /// Netzwerkfehler waehrend des Pollings werden geschluckt und wiederholt
    async fn nach_netzfehler(&self, abbruch: &CancellationToken, fehler: &str) -> HandshakeResult<()> {
        tracing::debug!(fehler, "Poll fehlgeschlagen, wiederhole");
        self.warten(abbruch, self.optionen.poll_intervall.max(FEHLER_PAUSE))
            .await
    }

    /// Strukturierter Server-Fehler, sonst Text-Fehler
    fn fehler_lesen(&self, antwort: &FetchAntwort) -> HandshakeError {
        match serde_json::from_str::<Info>(&antwort.body) {
            Ok(info) => info.into(),
            Err(_) => HandshakeError::Http(format!("HTTP {}: {}", antwort.status, antwort.body)),
        }
    }

    // -----------------------------------------------------------------------
    // Login / Logout
    // -----------------------------------------------------------------------

    /// Meldet den Benutzer an und gibt das Login-Token zurueck
    pub async fn login(&self, optionen: &VorgangsOptionen) -> HandshakeResult<String> {
        let ergebnis = self.login_intern(optionen).await;
        optionen.abschliessen(ergebnis)
    }

    async fn login_intern(&self, optionen: &VorgangsOptionen) -> HandshakeResult<String> {
        optionen.melden(&Info::neu(codes::PERFORMING_LOGIN, "Login wird durchgefuehrt"));

        let antwort = self
            .abrufen(&optionen.abbruch, "/api/login/initial", FetchAnfrage::post())
            .await?;
        if !antwort.ok() {
            return Err(self.fehler_lesen(&antwort));
        }
        let initial: LoginInitialResponse = antwort.json()?;

        let mut auth = initial.auth.clone();
        if let Some(seite) = &auth.login_page_url {
            if seite.starts_with('/') {
                auth.login_page_url = Some(self.url(seite));
            }
        }

        let auth_abbruch = CancellationToken::new();
        let abbruch = abbruch::zusammenfuehren(&[&optionen.abbruch, &auth_abbruch]);

        let handler = Arc::clone(&self.optionen.auth_handler);
        let poll_token = initial.poll_token.clone();
        let handler_task = tokio::spawn(async move {
            match handler.authentifizieren(poll_token, auth).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Authentifizierung nicht gestartet, Login wird abgebrochen");
                    auth_abbruch.cancel();
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Authentifizierung fehlgeschlagen, Login wird abgebrochen");
                    auth_abbruch.cancel();
                }
            }
        });

        let ergebnis = self.login_pollen(&initial.poll_token, abbruch.token()).await;
        handler_task.abort();

        let token = ergebnis?;
        *self.user_token.write() = Some(token.clone());
        tracing::info!("Login erfolgreich");
        Ok(token)
    }

    async fn login_pollen(
        &self,
        poll_token: &str,
        abbruch: &CancellationToken,
    ) -> HandshakeResult<String> {
        let cookie = self.optionen.use_cookie_auth;
        let pfad = if cookie {
            format!("/api/login/poll/{poll_token}?useCookie=true")
        } else {
            format!("/api/login/poll/{poll_token}")
        };

        loop {
            let antwort = match self
                .abrufen(abbruch, &pfad, FetchAnfrage::post().cookies(cookie))
                .await
            {
                Ok(antwort) => antwort,
                Err(HandshakeError::Http(e)) => {
                    self.nach_netzfehler(abbruch, &e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !antwort.ok() {
                return Err(self.fehler_lesen(&antwort));
            }
            if let Ok(LoginPollResponse {
                login_token: Some(token),
            }) = antwort.json::<LoginPollResponse>()
            {
                return Ok(token);
            }

            self.warten(abbruch, self.optionen.poll_intervall).await?;
        }
    }

    /// Verwirft das Login-Token; bei Cookie-Authentifizierung zusaetzlich serverseitig
    pub async fn logout(&self) -> HandshakeResult<()> {
        *self.user_token.write() = None;
        if self.optionen.use_cookie_auth {
            let antwort = self
                .abrufen(
                    &CancellationToken::new(),
                    "/api/logout",
                    FetchAnfrage::post().cookies(true),
                )
                .await?;
            if !antwort.ok() {
                return Err(self.fehler_lesen(&antwort));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Version / Validierung
    // -----------------------------------------------------------------------

    async fn meta_daten(&self, abbruch: &CancellationToken) -> HandshakeResult<ProtocolServerMetaData> {
        let antwort = self.abrufen(abbruch, "/api/meta", FetchAnfrage::get()).await?;
        if !antwort.ok() {
            return Err(self.fehler_lesen(&antwort));
        }
        antwort.json()
    }

    /// Prueft ob Server- und Client-Protokollversion kompatibel sind
    pub async fn ensure_compatibility(&self) -> HandshakeResult<()> {
        self.kompatibilitaet_pruefen(&CancellationToken::new()).await
    }

    async fn kompatibilitaet_pruefen(&self, abbruch: &CancellationToken) -> HandshakeResult<()> {
        let meta = self.meta_daten(abbruch).await?;
        let server = Version::parse(&meta.version)
            .map_err(|_| HandshakeError::InvalidServerVersion(meta.version.clone()))?;
        if !kompatibel(&server, &self.protokoll_version) {
            return Err(HandshakeError::IncompatibleProtocolVersions {
                client: self.protokoll_version.to_string(),
                server: server.to_string(),
            });
        }
        Ok(())
    }

    /// Prueft ob das aktuelle Login noch gilt. Jeder Fehler ergibt `false`.
    pub async fn validate(&self) -> bool {
        self.validieren(&CancellationToken::new())
            .await
            .unwrap_or(false)
    }

    /// Wie `validate`, liefert aber `Cancelled` bei Abbruch
    async fn validieren(&self, abbruch: &CancellationToken) -> HandshakeResult<bool> {
        let Ok(anfrage) = self.authentifiziert() else {
            return Ok(false);
        };
        match self.abrufen(abbruch, "/api/login/validate", anfrage).await {
            Ok(antwort) => Ok(antwort
                .json::<LoginValidateResponse>()
                .map(|r| r.valid)
                .unwrap_or(false)),
            Err(HandshakeError::Cancelled) => Err(HandshakeError::Cancelled),
            Err(e) => {
                tracing::debug!(fehler = %e, "Validierung fehlgeschlagen");
                Ok(false)
            }
        }
    }

    /// Kompatibilitaet pruefen und bei Bedarf anmelden
    ///
    /// Gibt das neue Login-Token zurueck wenn ein Login noetig war.
    async fn angemeldet_sicherstellen(
        &self,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<Option<String>> {
        self.kompatibilitaet_pruefen(&optionen.abbruch).await?;
        if self.validieren(&optionen.abbruch).await? {
            return Ok(None);
        }
        Ok(Some(self.login_intern(optionen).await?))
    }

    // -----------------------------------------------------------------------
    // Raeume
    // -----------------------------------------------------------------------

    /// Erstellt einen neuen Raum mit dem aktuellen Benutzer als Host
    pub async fn create_room(
        &self,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<CreateRoomResponse> {
        let ergebnis = self.raum_erstellen(optionen).await;
        optionen.abschliessen(ergebnis)
    }

    async fn raum_erstellen(
        &self,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<CreateRoomResponse> {
        let login_token = self.angemeldet_sicherstellen(optionen).await?;
        optionen.melden(&Info::neu(
            codes::AWAITING_SERVER_RESPONSE,
            "Warte auf Server-Antwort",
        ));

        let antwort = self
            .abrufen(&optionen.abbruch, "/api/session/create", self.authentifiziert()?)
            .await?;
        if !antwort.ok() {
            return Err(self.fehler_lesen(&antwort));
        }
        let mut raum: CreateRoomResponse = antwort.json()?;
        raum.login_token = login_token;
        tracing::info!(raum = %raum.room_id, "Raum erstellt");
        Ok(raum)
    }

    /// Tritt einem Raum bei; wartet bis der Host zustimmt oder ablehnt
    pub async fn join_room(
        &self,
        room_id: RoomId,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<JoinRoomResponse> {
        let ergebnis = self.raum_beitreten(room_id, optionen).await;
        optionen.abschliessen(ergebnis)
    }

    async fn raum_beitreten(
        &self,
        room_id: RoomId,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<JoinRoomResponse> {
        let login_token = self.angemeldet_sicherstellen(optionen).await?;
        optionen.melden(&Info::neu(
            codes::AWAITING_SERVER_RESPONSE,
            "Warte auf Server-Antwort",
        ));

        let pfad = format!("/api/session/join/{}", room_id.inner());
        let antwort = self
            .abrufen(&optionen.abbruch, &pfad, self.authentifiziert()?)
            .await?;
        if !antwort.ok() {
            return Err(self.fehler_lesen(&antwort));
        }
        let initial: JoinRoomInitialResponse = antwort.json()?;

        let mut ergebnis = self.beitritt_pollen(&initial.poll_token, optionen).await?;
        ergebnis.login_token = login_token;
        tracing::info!(raum = %ergebnis.room_id, "Raum beigetreten");
        Ok(ergebnis)
    }

    async fn beitritt_pollen(
        &self,
        poll_token: &str,
        optionen: &VorgangsOptionen,
    ) -> HandshakeResult<JoinRoomResponse> {
        let pfad = format!("/api/session/poll/{poll_token}");
        let abbruch = &optionen.abbruch;

        loop {
            let antwort = match self.abrufen(abbruch, &pfad, self.authentifiziert()?).await {
                Ok(antwort) => antwort,
                Err(HandshakeError::Http(e)) => {
                    self.nach_netzfehler(abbruch, &e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if antwort.status == 204 {
                self.warten(abbruch, self.optionen.poll_intervall).await?;
                continue;
            }
            if !antwort.ok() {
                return Err(self.fehler_lesen(&antwort));
            }

            // Anders als beim Login-Poll ist ein unlesbarer 2xx-Body hier endgueltig
            match antwort.json::<JoinPollAntwort>()? {
                JoinPollAntwort::Status(status) if status.failure => {
                    return Err(status.info.into());
                }
                JoinPollAntwort::Status(status) => optionen.melden(&status.info),
                JoinPollAntwort::Fertig(ergebnis) => return Ok(ergebnis),
            }

            self.warten(abbruch, self.optionen.poll_intervall).await?;
        }
    }

    // -----------------------------------------------------------------------
    // Verbindung
    // -----------------------------------------------------------------------

    /// Baut die Raumverbindung auf
    ///
    /// Waehlt den ersten Transport der eigenen Praeferenzliste den auch der
    /// Server anbietet und erzeugt ein frisches Schluessel-Paar fuer diese
    /// Verbindung. Der private Schluessel bleibt in der Verbindung
    /// ([`ProtocolConnection::private_key`]).
    pub async fn connect(
        &self,
        room_token: &str,
        host: Option<Peer>,
    ) -> HandshakeResult<ProtocolConnection> {
        let meta = self.meta_daten(&CancellationToken::new()).await?;
        let provider = passender_transport(&meta.transports, &self.optionen.transports).ok_or(
            HandshakeError::NoFittingTransport {
                angeboten: meta.transports.clone(),
            },
        )?;
        tracing::debug!(transport = provider.id(), "Transport gewaehlt");

        let crypto = self.optionen.crypto.clone();
        let schluessel = tokio::task::spawn_blocking(move || crypto.generate_key_pair())
            .await
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))??;

        let headers = HashMap::from([
            (header::JWT.to_string(), room_token.to_string()),
            (header::PUBLIC_KEY.to_string(), schluessel.public_key.clone()),
            (
                header::CLIENT.to_string(),
                self.optionen
                    .client
                    .clone()
                    .unwrap_or_else(|| STANDARD_CLIENT.to_string()),
            ),
            (header::COMPRESSION.to_string(), "gzip".to_string()),
        ]);

        let verbindung = provider.verbinden(self.basis_url(), headers).await?;
        Ok(ProtocolConnection::neu(
            verbindung,
            schluessel,
            self.optionen.crypto.clone(),
            host,
            self.optionen.anfrage_timeout,
        ))
    }
}

/// Erster Transport der Client-Praeferenz den der Server anbietet
fn passender_transport<'a>(
    angeboten: &[String],
    gewuenscht: &'a [Arc<dyn TransportProvider>],
) -> Option<&'a Arc<dyn TransportProvider>> {
    gewuenscht
        .iter()
        .find(|t| angeboten.iter().any(|a| a == t.id()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
