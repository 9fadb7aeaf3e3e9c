//! WebSocket-Endpunkt fuer Raum-Peers
//!
//! Der Upgrade-Request traegt das Raum-Token (`x-oct-jwt`), den
//! oeffentlichen Schluessel des Peers und die Client-Kennung. Jeder
//! Textframe ist ein JSON-Umschlag. Mit dem Ende der Verbindung verlaesst
//! der Peer den Raum.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use oct_core::PeerId;
use oct_protocol::transport::header;
use oct_protocol::Message;
use oct_relay::{Peer, PeerChannel};
use std::sync::Arc;

use crate::api::AppState;
use crate::fehler::ApiFehler;
use crate::metriken::gauges_aktualisieren;
use crate::sitzung::Zulassung;

const UNBEKANNTER_CLIENT: &str = "unbekannt";

fn header_wert(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `GET /api/session/ws`
pub async fn ws_verbinden(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Some(zulassung) = header_wert(&headers, header::JWT)
        .and_then(|token| state.sitzungen.zulassung_einloesen(&token))
    else {
        return ApiFehler::NichtAutorisiert.into_response();
    };
    let Some(public_key) = header_wert(&headers, header::PUBLIC_KEY).filter(|k| !k.is_empty()) else {
        return ApiFehler::UngueltigeAnfrage("Oeffentlicher Schluessel fehlt".into()).into_response();
    };
    let client = header_wert(&headers, header::CLIENT).unwrap_or_else(|| UNBEKANNTER_CLIENT.into());

    if let Some(kompression) = header_wert(&headers, header::COMPRESSION) {
        tracing::debug!(kompression = %kompression, "Kompression nicht unterstuetzt, sende unkomprimiert");
    }

    upgrade.on_upgrade(move |socket| peer_sitzung(state, zulassung, public_key, client, socket))
}

async fn peer_sitzung(
    state: AppState,
    zulassung: Zulassung,
    public_key: String,
    client: String,
    socket: WebSocket,
) {
    let peer_id = PeerId::new();
    let (kanal, mut ausgang) = PeerChannel::neu(peer_id);
    let peer = Arc::new(Peer {
        id: peer_id,
        name: zulassung.benutzer.name.clone(),
        email: zulassung.benutzer.email.clone(),
        host: zulassung.host,
        public_key,
        client,
        raum: zulassung.raum,
        kanal,
    });

    let ergebnis = if zulassung.host {
        state.raeume.eroeffnen(zulassung.raum, Arc::clone(&peer))
    } else {
        state.raeume.beitreten(zulassung.raum, Arc::clone(&peer))
    };
    let raum = match ergebnis {
        Ok(raum) => raum,
        Err(e) => {
            tracing::warn!(raum = %zulassung.raum, peer = %peer_id, fehler = %e, "Peer abgewiesen");
            let mut socket = socket;
            if let Err(e) = socket.close().await {
                tracing::debug!(fehler = %e, "WebSocket bereits geschlossen");
            }
            return;
        }
    };
    gauges_aktualisieren(&state.metriken, &state.raeume);

    let (mut schreiber, mut leser) = socket.split();

    let schreib_task = tokio::spawn(async move {
        while let Some(nachricht) = ausgang.recv().await {
            let json = match nachricht.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(fehler = %e, "Nachricht nicht serialisierbar");
                    continue;
                }
            };
            if schreiber.send(WsMessage::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = schreiber.close().await;
    });

    let relay = state.raeume.relay().clone();
    while let Some(frame) = leser.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
                Ok(nachricht) => relay.verarbeiten(&raum, &peer, nachricht),
                Err(e) => {
                    tracing::warn!(peer = %peer_id, fehler = %e, "Ungueltiger Umschlag verworfen");
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer_id, fehler = %e, "WebSocket-Fehler");
                break;
            }
        }
    }

    state.raeume.verlassen(&peer);
    schreib_task.abort();
    gauges_aktualisieren(&state.metriken, &state.raeume);
    tracing::debug!(peer = %peer_id, "Peer-Sitzung beendet");
}
