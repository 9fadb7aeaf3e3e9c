//! HTTP-Abstraktion fuer den Sitzungsaufbau
//!
//! Der Handshake spricht nur ueber [`HttpFetch`]. In Produktion steckt
//! [`ReqwestFetch`] dahinter, Tests verwenden geskriptete Antworten.
//! Abbruch erfolgt durch Verwerfen des Futures.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{HandshakeError, HandshakeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Methode {
    Get,
    Post,
}

/// Eine HTTP-Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAnfrage {
    pub methode: Methode,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Cookies mitsenden (Cookie-Authentifizierung)
    pub mit_cookies: bool,
}

impl FetchAnfrage {
    pub fn get() -> Self {
        Self {
            methode: Methode::Get,
            headers: Vec::new(),
            body: None,
            mit_cookies: false,
        }
    }

    pub fn post() -> Self {
        Self {
            methode: Methode::Post,
            ..Self::get()
        }
    }

    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn cookies(mut self, mit_cookies: bool) -> Self {
        self.mit_cookies = mit_cookies;
        self
    }
}

/// Eine HTTP-Antwort, Body bereits vollstaendig gelesen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAntwort {
    pub status: u16,
    pub body: String,
}

impl FetchAntwort {
    pub fn neu(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> HandshakeResult<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| HandshakeError::InvalidServerResponse(e.to_string()))
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str, anfrage: FetchAnfrage) -> HandshakeResult<FetchAntwort>;
}

// ---------------------------------------------------------------------------
// reqwest-Implementierung
// ---------------------------------------------------------------------------

/// [`HttpFetch`] auf Basis von reqwest
///
/// Aufrufe mit `mit_cookies` laufen ueber einen Client mit Cookie-Speicher,
/// alle anderen ueber einen Client ohne Cookies.
#[derive(Debug, Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
    cookie_client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn neu() -> HandshakeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        let cookie_client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        Ok(Self {
            client,
            cookie_client,
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn fetch(&self, url: &str, anfrage: FetchAnfrage) -> HandshakeResult<FetchAntwort> {
        let client = if anfrage.mit_cookies {
            &self.cookie_client
        } else {
            &self.client
        };
        let mut builder = match anfrage.methode {
            Methode::Get => client.get(url),
            Methode::Post => client.post(url),
        };
        for (name, wert) in &anfrage.headers {
            builder = builder.header(name.as_str(), wert.as_str());
        }
        if let Some(body) = anfrage.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let antwort = builder
            .send()
            .await
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        let status = antwort.status().as_u16();
        let body = antwort
            .text()
            .await
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        Ok(FetchAntwort { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reqwest_fetch_sendet_header_und_liest_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/validate"))
            .and(header("x-oct-jwt", "T"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"valid":true}"#))
            .mount(&server)
            .await;

        let fetch = ReqwestFetch::neu().unwrap();
        let antwort = fetch
            .fetch(
                &format!("{}/api/login/validate", server.uri()),
                FetchAnfrage::post().headers(vec![("x-oct-jwt".into(), "T".into())]),
            )
            .await
            .unwrap();
        assert!(antwort.ok());
        assert_eq!(antwort.body, r#"{"valid":true}"#);
    }

    #[tokio::test]
    async fn reqwest_fetch_meldet_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meta"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let fetch = ReqwestFetch::neu().unwrap();
        let antwort = fetch
            .fetch(&format!("{}/api/meta", server.uri()), FetchAnfrage::get())
            .await
            .unwrap();
        assert!(!antwort.ok());
        assert_eq!(antwort.status, 503);
    }

    #[tokio::test]
    async fn cookies_nur_wenn_angefordert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/poll/P"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "oct-jwt=abc; Path=/")
                    .set_body_string(r#"{"loginToken":"abc"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"valid":true}"#))
            .mount(&server)
            .await;

        let fetch = ReqwestFetch::neu().unwrap();
        fetch
            .fetch(
                &format!("{}/api/login/poll/P", server.uri()),
                FetchAnfrage::post().cookies(true),
            )
            .await
            .unwrap();
        let validate = format!("{}/api/login/validate", server.uri());
        fetch.fetch(&validate, FetchAnfrage::post()).await.unwrap();
        fetch
            .fetch(&validate, FetchAnfrage::post().cookies(true))
            .await
            .unwrap();

        let anfragen = server.received_requests().await.unwrap();
        let cookies: Vec<bool> = anfragen
            .iter()
            .filter(|r| r.url.path() == "/api/login/validate")
            .map(|r| r.headers.contains_key("cookie"))
            .collect();
        assert_eq!(cookies, vec![false, true]);
    }

    #[tokio::test]
    async fn verbindungsfehler_ist_http_fehler() {
        let fetch = ReqwestFetch::neu().unwrap();
        let e = fetch
            .fetch("http://127.0.0.1:1/api/meta", FetchAnfrage::get())
            .await
            .unwrap_err();
        assert!(matches!(e, HandshakeError::Http(_)));
    }
}
