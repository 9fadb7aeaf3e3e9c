//! Raum erstellen, beitreten, Beitritt pollen
//!
//! Ein Beitritt wird dem Host als `peer/joinRequest` ueber den Relay
//! vorgelegt. Ein Ergebnis ungleich `null` ist eine Zustimmung und
//! enthaelt den Workspace, alles andere eine Ablehnung.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use oct_core::RoomId;
use oct_protocol::info::{codes, Info};
use oct_protocol::messages::{methoden, NachrichtenId, RequestMessage};
use oct_protocol::types::{CreateRoomResponse, JoinRoomInitialResponse, JoinRoomResponse, User, Workspace};
use oct_protocol::Message;
use oct_relay::{RelayError, Room};
use std::sync::Arc;

use crate::api::{benutzer_aus_headers, AppState};
use crate::fehler::{ApiFehler, ApiResult};
use crate::sitzung::BeitrittsStatus;

/// `POST /api/session/create`
///
/// Der Raum existiert erst, wenn sich der Host mit dem Raum-Token verbindet.
pub async fn raum_erstellen(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CreateRoomResponse>> {
    let benutzer = benutzer_aus_headers(&headers, &state)?;
    let room_id = RoomId::new();
    tracing::info!(raum = %room_id, host = %benutzer.name, "Raum reserviert");
    let room_token = state.sitzungen.zulassung_ausstellen(room_id, benutzer, true);
    Ok(Json(CreateRoomResponse {
        room_id,
        room_token,
        login_token: None,
    }))
}

/// `POST /api/session/join/:room_id`
pub async fn raum_beitreten(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    headers: HeaderMap,
) -> ApiResult<Json<JoinRoomInitialResponse>> {
    let benutzer = benutzer_aus_headers(&headers, &state)?;
    let raum = state
        .raeume
        .raum(&room_id)
        .ok_or(ApiFehler::RaumNichtGefunden(room_id))?;

    let poll_token = state.sitzungen.beitritt_starten(room_id);
    tracing::info!(raum = %room_id, benutzer = %benutzer.name, "Beitritt angefragt");
    tokio::spawn(host_fragen(state, raum, benutzer, poll_token.clone()));

    Ok(Json(JoinRoomInitialResponse {
        room_id,
        poll_token,
    }))
}

/// Legt dem Host die Beitrittsanfrage vor und traegt den Entscheid ein
async fn host_fragen(state: AppState, raum: Arc<Room>, benutzer: User, poll_token: String) {
    let anfrage = RequestMessage {
        id: NachrichtenId::Text(poll_token.clone()),
        method: methoden::PEER_JOIN_REQUEST.to_string(),
        params: vec![serde_json::to_value(&benutzer).unwrap_or_default()],
        target: None,
        origin: None,
    };

    let antwort = state
        .raeume
        .relay()
        .anfrage_senden(&raum.host, &anfrage, Some(state.beitritt_timeout()))
        .await;

    let entscheid = match antwort {
        Ok(Message::Response(r)) if !r.result.is_null() => {
            let workspace = serde_json::from_value::<Workspace>(r.result).unwrap_or_else(|e| {
                tracing::debug!(fehler = %e, "Workspace in Zustimmung unlesbar");
                Workspace::default()
            });
            let room_token = state
                .sitzungen
                .zulassung_ausstellen(raum.id, benutzer.clone(), false);
            tracing::info!(raum = %raum.id, benutzer = %benutzer.name, "Beitritt zugelassen");
            BeitrittsStatus::Zugelassen(JoinRoomResponse {
                room_id: raum.id,
                room_token,
                workspace,
                host: raum.host.info(),
                login_token: None,
            })
        }
        Ok(_) => {
            tracing::info!(raum = %raum.id, benutzer = %benutzer.name, "Beitritt abgelehnt");
            BeitrittsStatus::Abgelehnt(Info::neu(codes::JOIN_REJECTED, "Der Host hat den Beitritt abgelehnt"))
        }
        Err(RelayError::RequestTimedOut { .. }) => BeitrittsStatus::Abgelehnt(Info::neu(
            codes::JOIN_TIMEOUT,
            "Der Host hat nicht rechtzeitig geantwortet",
        )),
        Err(e) => {
            tracing::debug!(raum = %raum.id, fehler = %e, "Beitrittsanfrage nicht zustellbar");
            BeitrittsStatus::Abgelehnt(Info::neu(codes::JOIN_REJECTED, e.to_string()))
        }
    };

    state.sitzungen.beitritt_entscheiden(&poll_token, entscheid);
}

/// `POST /api/session/poll/:token`
pub async fn beitritt_poll(
    State(state): State<AppState>,
    Path(poll_token): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    benutzer_aus_headers(&headers, &state)?;
    match state
        .sitzungen
        .beitritt_pollen(&poll_token, state.poll_halten())
        .await?
    {
        Some(antwort) => Ok(Json(antwort).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
