//! DTOs der HTTP-Control-Plane
//!
//! Feldnamen entsprechen dem JSON auf dem Draht (camelCase).

use oct_core::{PeerId, RoomId};
use serde::{Deserialize, Serialize};

use crate::info::Info;

/// Authentifizierungs-Metadaten aus `/api/login/initial`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_page_url: Option<String>,
    #[serde(default)]
    pub providers: Vec<AuthProvider>,
}

/// Ein vom Server angebotener Login-Weg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    pub name: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInitialResponse {
    pub poll_token: String,
    pub auth: AuthMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPollResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
}

/// Body von `POST /api/login/simple`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleLoginRequest {
    pub token: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginValidateResponse {
    pub valid: bool,
}

/// Antwort von `GET /api/meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolServerMetaData {
    pub version: String,
    #[serde(default)]
    pub transports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub room_token: String,
    /// Nur gesetzt wenn fuer den Aufruf ein neuer Login noetig war
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomInitialResponse {
    pub room_id: RoomId,
    pub poll_token: String,
}

/// Zwischenstand (oder endgueltiger Fehlschlag) eines Beitritts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomPollResponse {
    #[serde(flatten)]
    pub info: Info,
    pub failure: bool,
}

/// Geteilter Arbeitsbereich des Hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    #[serde(default)]
    pub folders: Vec<String>,
}

/// Oeffentliche Sicht auf einen Peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub host: bool,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Peer inklusive oeffentlichem Schluessel (fuer `peer/info` und `room/joined`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMitSchluessel {
    #[serde(flatten)]
    pub peer: Peer,
    pub public_key: String,
}

/// Parameter von `peer/info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInit {
    #[serde(rename = "self")]
    pub selbst: Peer,
    pub host: PeerMitSchluessel,
    #[serde(default)]
    pub guests: Vec<PeerMitSchluessel>,
}

/// Endgueltiges Ergebnis eines Beitritts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room_id: RoomId,
    pub room_token: String,
    pub workspace: Workspace,
    pub host: Peer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
}

/// Antwort auf `/api/session/poll/{token}` (Reihenfolge = Prioritaet beim Parsen)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinPollAntwort {
    Status(JoinRoomPollResponse),
    Fertig(JoinRoomResponse),
}

/// Benutzer-Identitaet wie sie dem Host bei `peer/joinRequest` gezeigt wird
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_poll_status_vor_ergebnis() {
        let status = json!({"code":"WaitingForHost","message":"warte","params":[],"failure":false});
        let antwort: JoinPollAntwort = serde_json::from_value(status).unwrap();
        assert!(matches!(antwort, JoinPollAntwort::Status(ref s) if !s.failure));

        let fertig = json!({
            "roomId": "00000000-0000-0000-0000-000000000001",
            "roomToken": "rt",
            "workspace": {"name": "ws", "folders": ["a"]},
            "host": {"id": "00000000-0000-0000-0000-000000000002", "host": true, "name": "Hanna"}
        });
        let antwort: JoinPollAntwort = serde_json::from_value(fertig).unwrap();
        let JoinPollAntwort::Fertig(r) = antwort else {
            panic!("Erwartet Fertig");
        };
        assert_eq!(r.room_token, "rt");
        assert!(r.host.host);
    }

    #[test]
    fn peer_init_nutzt_self_feld() {
        let p = Peer {
            id: PeerId::new(),
            host: false,
            name: "Gast".into(),
            email: None,
        };
        let init = PeerInit {
            selbst: p.clone(),
            host: PeerMitSchluessel {
                peer: Peer {
                    host: true,
                    ..p.clone()
                },
                public_key: "pk".into(),
            },
            guests: vec![],
        };
        let wert = serde_json::to_value(&init).unwrap();
        assert_eq!(wert["self"]["name"], "Gast");
        assert_eq!(wert["host"]["publicKey"], "pk");
        assert_eq!(wert["host"]["host"], true);
    }

    #[test]
    fn login_poll_ohne_token() {
        let r: LoginPollResponse = serde_json::from_str("{}").unwrap();
        assert!(r.login_token.is_none());
    }
}
