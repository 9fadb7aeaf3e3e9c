//! Integrationstests: echter Server, echter Client ueber HTTP und WebSocket
//!
//! Host erstellt einen Raum, ein Gast tritt bei, der Host stimmt ueber
//! `peer/joinRequest` zu und verschluesselte Broadcasts erreichen den Gast.

use async_trait::async_trait;
use oct_client::{
    AuthHandler, ConnectionProvider, ConnectionProviderOptions, HandshakeError, HandshakeResult,
    ProtocolConnection, ReqwestFetch, VerbindungsEreignis, VorgangsOptionen,
    WebSocketTransportProvider,
};
use oct_crypto::{CryptoProvider, RsaAesBackend};
use oct_protocol::info::codes;
use oct_protocol::messages::methoden;
use oct_protocol::types::AuthMetadata;
use oct_protocol::TransportProvider;
use oct_server::config::ServerConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const WARTEZEIT: Duration = Duration::from_secs(10);

/// Meldet sich ueber die einfache Login-Seite an
struct NamensLogin {
    name: String,
    http: reqwest::Client,
}

#[async_trait]
impl AuthHandler for NamensLogin {
    async fn authentifizieren(
        &self,
        poll_token: String,
        metadaten: AuthMetadata,
    ) -> HandshakeResult<bool> {
        let Some(seite) = metadaten.login_page_url else {
            return Ok(false);
        };
        let antwort = self
            .http
            .post(seite)
            .json(&json!({"token": poll_token, "user": self.name}))
            .send()
            .await
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        Ok(antwort.status().is_success())
    }
}

async fn server_starten() -> String {
    let mut config = ServerConfig::default();
    config.sitzung.poll_halten_ms = 200;
    config.observability.aktiviert = false;
    let state = oct_server::zustand_aufbauen(config).unwrap();
    let app = oct_server::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{adresse}")
}

fn provider(url: &str, name: &str) -> ConnectionProvider {
    let mut optionen = ConnectionProviderOptions::neu(
        url,
        Arc::new(ReqwestFetch::neu().unwrap()),
        Arc::new(NamensLogin {
            name: name.to_string(),
            http: reqwest::Client::new(),
        }),
    );
    optionen.client = Some(format!("Test-Client {name}"));
    optionen.transports = vec![Arc::new(WebSocketTransportProvider::neu()) as Arc<dyn TransportProvider>];
    optionen.poll_intervall = Duration::from_millis(50);
    optionen.crypto = CryptoProvider::mit_backend(Arc::new(RsaAesBackend::mit_rsa_bits(1024)));
    ConnectionProvider::neu(optionen).unwrap()
}

/// Wartet auf das erste Ereignis fuer das `passt` einen Wert liefert
async fn warten_auf<T>(
    ereignisse: &mut mpsc::Receiver<VerbindungsEreignis>,
    mut passt: impl FnMut(VerbindungsEreignis) -> Option<T>,
) -> T {
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            let ereignis = ereignisse.recv().await.expect("Verbindung beendet");
            if let Some(wert) = passt(ereignis) {
                return wert;
            }
        }
    })
    .await
    .expect("Ereignis nicht rechtzeitig erhalten")
}

async fn host_mit_raum(url: &str) -> (ProtocolConnection, mpsc::Receiver<VerbindungsEreignis>, oct_core::RoomId) {
    let host = provider(url, "Hanna");
    let raum = host.create_room(&VorgangsOptionen::default()).await.unwrap();
    assert!(raum.login_token.is_some());

    let verbindung = host.connect(&raum.room_token, None).await.unwrap();
    let mut ereignisse = verbindung.ereignisse().unwrap();
    let init = warten_auf(&mut ereignisse, |e| match e {
        VerbindungsEreignis::PeerInfo(init) => Some(init),
        _ => None,
    })
    .await;
    assert!(init.selbst.host);
    assert!(init.guests.is_empty());
    (verbindung, ereignisse, raum.room_id)
}

#[tokio::test]
async fn gast_tritt_bei_und_empfaengt_broadcast() {
    let url = server_starten().await;
    let (host, mut host_ereignisse, room_id) = host_mit_raum(&url).await;

    let gast = provider(&url, "Gerd");
    let beitritt = tokio::spawn(async move {
        let antwort = gast.join_room(room_id, &VorgangsOptionen::default()).await;
        (gast, antwort)
    });

    let (id, params) = warten_auf(&mut host_ereignisse, |e| match e {
        VerbindungsEreignis::Anfrage { id, method, params, .. }
            if method == methoden::PEER_JOIN_REQUEST =>
        {
            Some((id, params))
        }
        _ => None,
    })
    .await;
    assert_eq!(params[0]["name"], "Gerd");
    host.antworten(id, json!({"name": "projekt", "folders": ["src"]}))
        .await
        .unwrap();

    let (gast, antwort) = beitritt.await.unwrap();
    let zugelassen = antwort.unwrap();
    assert_eq!(zugelassen.room_id, room_id);
    assert_eq!(zugelassen.workspace.name, "projekt");
    assert_eq!(zugelassen.host.name, "Hanna");

    let gast_verbindung = gast
        .connect(&zugelassen.room_token, Some(zugelassen.host.clone()))
        .await
        .unwrap();
    let mut gast_ereignisse = gast_verbindung.ereignisse().unwrap();
    let init = warten_auf(&mut gast_ereignisse, |e| match e {
        VerbindungsEreignis::PeerInfo(init) => Some(init),
        _ => None,
    })
    .await;
    assert!(!init.selbst.host);
    assert_eq!(init.host.peer.id, zugelassen.host.id);

    let beigetreten = warten_auf(&mut host_ereignisse, |e| match e {
        VerbindungsEreignis::PeerBeigetreten(p) => Some(p),
        _ => None,
    })
    .await;
    assert_eq!(beigetreten.peer.id, init.selbst.id);

    host.broadcast_senden("editor/cursor", vec![json!({"zeile": 3})])
        .await
        .unwrap();
    let (method, params) = warten_auf(&mut gast_ereignisse, |e| match e {
        VerbindungsEreignis::Broadcast { method, params, .. } => Some((method, params)),
        _ => None,
    })
    .await;
    assert_eq!(method, "editor/cursor");
    assert_eq!(params, vec![json!({"zeile": 3})]);

    // Host geht, der Raum wird geschlossen
    host.schliessen().await;
    warten_auf(&mut gast_ereignisse, |e| match e {
        VerbindungsEreignis::RaumGeschlossen => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn abgelehnter_beitritt() {
    let url = server_starten().await;
    let (host, mut host_ereignisse, room_id) = host_mit_raum(&url).await;

    let gast = provider(&url, "Gerd");
    let beitritt =
        tokio::spawn(async move { gast.join_room(room_id, &VorgangsOptionen::default()).await });

    let id = warten_auf(&mut host_ereignisse, |e| match e {
        VerbindungsEreignis::Anfrage { id, .. } => Some(id),
        _ => None,
    })
    .await;
    host.antworten(id, serde_json::Value::Null).await.unwrap();

    match beitritt.await.unwrap() {
        Err(HandshakeError::ServerError { code, .. }) => assert_eq!(code, codes::JOIN_REJECTED),
        andere => panic!("Erwartet JoinRejected, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn beitritt_zu_unbekanntem_raum_schlaegt_fehl() {
    let url = server_starten().await;
    let gast = provider(&url, "Gerd");
    let ergebnis = gast
        .join_room(oct_core::RoomId::new(), &VorgangsOptionen::default())
        .await;
    match ergebnis {
        Err(HandshakeError::ServerError { code, .. }) => assert_eq!(code, codes::ROOM_NOT_FOUND),
        andere => panic!("Erwartet RoomNotFound, erhalten {andere:?}"),
    }
}
