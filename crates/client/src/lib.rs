//! # oct-client
//!
//! Client-seitiger Sitzungsaufbau fuer OCT-Raeume.
//!
//! ## Module
//! - `handshake` - ConnectionProvider: Login, Raum erstellen/beitreten, Verbinden
//! - `connection` - ProtocolConnection ueber einem offenen Transport
//! - `websocket` - WebSocket-Transport
//! - `fetch` - HTTP-Abstraktion (reqwest)
//! - `abbruch` - Zusammenfuehren von Abbruch-Signalen
//! - `error` - Fehlertypen

pub mod abbruch;
pub mod connection;
pub mod error;
pub mod fetch;
pub mod handshake;
pub mod websocket;

pub use connection::{ProtocolConnection, VerbindungsEreignis};
pub use error::{HandshakeError, HandshakeResult};
pub use fetch::{FetchAnfrage, FetchAntwort, HttpFetch, ReqwestFetch};
pub use handshake::{
    AuthHandler, ConnectionProvider, ConnectionProviderOptions, Reporter, VorgangsOptionen,
};
pub use websocket::WebSocketTransportProvider;

#[cfg(test)]
pub(crate) mod testhilfe {
    use async_trait::async_trait;
    use oct_crypto::{CryptoProvider, RsaAesBackend};
    use oct_protocol::{
        Message, MessageTransport, TransportError, TransportProvider, TransportVerbindung,
    };
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::error::{HandshakeError, HandshakeResult};
    use crate::fetch::{FetchAnfrage, FetchAntwort, HttpFetch, Methode};

    /// Krypto mit kleinen Schluesseln fuer schnelle Tests
    pub fn crypto() -> CryptoProvider {
        CryptoProvider::mit_backend(Arc::new(RsaAesBackend::mit_rsa_bits(1024)))
    }

    /// Transport im Speicher: gesendete Umschlaege landen in `ausgang`
    pub struct MockTransport {
        ausgang: mpsc::UnboundedSender<Message>,
    }

    impl MockTransport {
        pub fn neu() -> (
            TransportVerbindung,
            mpsc::Sender<Message>,
            mpsc::UnboundedReceiver<Message>,
        ) {
            let (ausgang_tx, ausgang_rx) = mpsc::unbounded_channel();
            let (eingang_tx, eingang) = mpsc::channel(64);
            let verbindung = TransportVerbindung {
                transport: Box::new(MockTransport {
                    ausgang: ausgang_tx,
                }),
                eingang,
            };
            (verbindung, eingang_tx, ausgang_rx)
        }
    }

    #[async_trait]
    impl MessageTransport for MockTransport {
        async fn senden(&self, nachricht: Message) -> Result<(), TransportError> {
            self.ausgang
                .send(nachricht)
                .map_err(|_| TransportError::Geschlossen)
        }

        async fn schliessen(&self) {}
    }

    /// Provider der sich die Verbindungsparameter merkt
    pub struct FesterTransport {
        id: String,
        aufruf: Mutex<Option<(String, HashMap<String, String>)>>,
    }

    impl FesterTransport {
        pub fn neu(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                aufruf: Mutex::new(None),
            })
        }

        pub fn headers(&self) -> Option<HashMap<String, String>> {
            self.aufruf.lock().as_ref().map(|(_, h)| h.clone())
        }

        pub fn basis_url(&self) -> Option<String> {
            self.aufruf.lock().as_ref().map(|(u, _)| u.clone())
        }
    }

    #[async_trait]
    impl TransportProvider for FesterTransport {
        fn id(&self) -> &str {
            &self.id
        }

        async fn verbinden(
            &self,
            basis_url: &str,
            headers: HashMap<String, String>,
        ) -> Result<TransportVerbindung, TransportError> {
            *self.aufruf.lock() = Some((basis_url.to_string(), headers));
            let (verbindung, _, _) = MockTransport::neu();
            Ok(verbindung)
        }
    }

    /// Geskriptete Antwort
    pub enum Skript {
        Antwort(FetchAntwort),
        Netzfehler,
        /// Antwortet nie
        Haengen,
    }

    impl Skript {
        pub fn json(status: u16, body: serde_json::Value) -> Self {
            Self::Antwort(FetchAntwort::neu(status, body.to_string()))
        }

        pub fn text(status: u16, body: &str) -> Self {
            Self::Antwort(FetchAntwort::neu(status, body))
        }
    }

    /// [`HttpFetch`] das Antworten in fester Reihenfolge liefert
    ///
    /// Jeder Eintrag erwartet einen Pfad (ohne Basis-URL und Query).
    pub struct SkriptFetch {
        skript: Mutex<VecDeque<(String, Skript)>>,
        aufrufe: Mutex<Vec<(Methode, String, Vec<(String, String)>)>>,
    }

    impl SkriptFetch {
        pub fn neu(skript: Vec<(&str, Skript)>) -> Arc<Self> {
            Arc::new(Self {
                skript: Mutex::new(
                    skript
                        .into_iter()
                        .map(|(pfad, s)| (pfad.to_string(), s))
                        .collect(),
                ),
                aufrufe: Mutex::new(Vec::new()),
            })
        }

        /// Bisherige Aufrufe: Methode, URL, Header
        pub fn aufrufe(&self) -> Vec<(Methode, String, Vec<(String, String)>)> {
            self.aufrufe.lock().clone()
        }
    }

    #[async_trait]
    impl HttpFetch for SkriptFetch {
        async fn fetch(&self, url: &str, anfrage: FetchAnfrage) -> HandshakeResult<FetchAntwort> {
            self.aufrufe
                .lock()
                .push((anfrage.methode, url.to_string(), anfrage.headers.clone()));

            let pfad = url
                .strip_prefix("http://oct.test")
                .unwrap_or(url)
                .split('?')
                .next()
                .unwrap_or_default()
                .to_string();

            let naechster = self.skript.lock().pop_front();
            match naechster {
                Some((erwartet, skript)) if erwartet == pfad => match skript {
                    Skript::Antwort(antwort) => Ok(antwort),
                    Skript::Netzfehler => Err(HandshakeError::Http("Verbindung abgelehnt".into())),
                    Skript::Haengen => std::future::pending().await,
                },
                Some((erwartet, _)) => Err(HandshakeError::InvalidServerResponse(format!(
                    "Unerwarteter Aufruf {pfad}, erwartet {erwartet}"
                ))),
                None => Err(HandshakeError::InvalidServerResponse(format!(
                    "Unerwarteter Aufruf {pfad}, Skript leer"
                ))),
            }
        }
    }
}
