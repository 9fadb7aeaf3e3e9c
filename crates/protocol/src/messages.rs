//! Nachrichten-Umschlaege (Envelope-Modell)
//!
//! Definiert alle Nachrichten die nach dem Handshake ueber den Transport
//! zwischen Peers und Relay ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: Requests tragen eine `id`, der Relay ersetzt
//!   sie beim Weiterleiten durch einen eigenen Korrelationsschluessel
//! - Broadcasts sind entweder unverschluesselt oder tragen pro Empfaenger
//!   einen asymmetrisch verschluesselten Sitzungsschluessel
//! - Weiterleitungen erzeugen immer neue Kopien (`mit_*`-Methoden),
//!   eine empfangene Nachricht wird nie in-place umgeschrieben

use oct_core::PeerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Nachrichten-ID
// ---------------------------------------------------------------------------

/// ID einer Anfrage (Clients vergeben Zahlen, der Relay Zeichenketten)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NachrichtenId {
    Zahl(u64),
    Text(String),
}

impl std::fmt::Display for NachrichtenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zahl(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for NachrichtenId {
    fn from(n: u64) -> Self {
        Self::Zahl(n)
    }
}

impl From<String> for NachrichtenId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for NachrichtenId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Einzelne Nachrichtenarten
// ---------------------------------------------------------------------------

/// Anfrage an einen Peer (ohne `target` an den Host des Raums)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: NachrichtenId,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PeerId>,
}

impl RequestMessage {
    /// Kopie mit neuer ID (Korrelationsschluessel des Relays)
    pub fn mit_id(&self, id: impl Into<NachrichtenId>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    /// Kopie mit gesetztem Absender
    pub fn mit_origin(&self, origin: PeerId) -> Self {
        Self {
            origin: Some(origin),
            ..self.clone()
        }
    }
}

/// Erfolgreiche Antwort auf eine Anfrage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: NachrichtenId,
    #[serde(default)]
    pub result: Value,
}

/// Fehler-Antwort auf eine Anfrage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseErrorMessage {
    pub id: NachrichtenId,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub params: Vec<String>,
}

/// Benachrichtigung ohne Antwort (ohne `target` an den Host des Raums)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PeerId>,
}

impl NotificationMessage {
    /// Kopie mit gesetztem Absender
    pub fn mit_origin(&self, origin: PeerId) -> Self {
        Self {
            origin: Some(origin),
            ..self.clone()
        }
    }
}

/// Verschluesselter Sitzungsschluessel fuer genau einen Empfaenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub target: PeerId,
    /// Base64: asymmetrisch verschluesselter symmetrischer Schluessel
    pub key: String,
}

/// Verschluesselungs-Metadaten eines Broadcasts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    #[serde(default)]
    pub keys: Vec<EncryptedKey>,
}

/// Metadaten eines Broadcasts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMetadata {
    #[serde(default)]
    pub encryption: EncryptionMetadata,
}

/// Verschluesselter Broadcast-Inhalt (steht in `params[0]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Base64-IV der symmetrischen Verschluesselung
    pub iv: String,
    /// Base64-Ciphertext der JSON-kodierten Original-Parameter
    pub data: String,
}

/// Broadcast an alle anderen Peers eines Raums
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Wird vom Relay gesetzt, Werte des Absenders werden ueberschrieben
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PeerId>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub metadata: BroadcastMetadata,
}

impl BroadcastMessage {
    /// Unverschluesselter Broadcast
    pub fn klartext(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            origin: None,
            method: method.into(),
            params,
            metadata: BroadcastMetadata::default(),
        }
    }

    /// Ein Broadcast gilt als verschluesselt gdw. die Schluesselliste nicht leer ist
    pub fn ist_verschluesselt(&self) -> bool {
        !self.metadata.encryption.keys.is_empty()
    }

    /// Sucht den Schluessel-Eintrag fuer einen Empfaenger
    pub fn schluessel_fuer(&self, peer: &PeerId) -> Option<&EncryptedKey> {
        self.metadata
            .encryption
            .keys
            .iter()
            .find(|k| &k.target == peer)
    }

    /// Kopie mit gesetztem Absender
    pub fn mit_origin(&self, origin: PeerId) -> Self {
        Self {
            origin: Some(origin),
            ..self.clone()
        }
    }

    /// Kopie die ausschliesslich den Schluessel eines Empfaengers enthaelt
    pub fn mit_einzelnem_schluessel(&self, schluessel: EncryptedKey) -> Self {
        Self {
            metadata: BroadcastMetadata {
                encryption: EncryptionMetadata {
                    keys: vec![schluessel],
                },
            },
            ..self.clone()
        }
    }

    /// Liest den verschluesselten Inhalt aus `params[0]`
    pub fn verschluesselter_inhalt(&self) -> Option<EncryptedContent> {
        self.params
            .first()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

// ---------------------------------------------------------------------------
// Haupt-Enum: Message
// ---------------------------------------------------------------------------

/// Alle moeglichen Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Message {
    Request(RequestMessage),
    Response(ResponseMessage),
    ResponseError(ResponseErrorMessage),
    Notification(NotificationMessage),
    Broadcast(BroadcastMessage),
}

impl Message {
    /// Erstellt eine Anfrage
    pub fn request(
        id: impl Into<NachrichtenId>,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self::Request(RequestMessage {
            id: id.into(),
            method: method.into(),
            params,
            target: None,
            origin: None,
        })
    }

    /// Erstellt eine erfolgreiche Antwort
    pub fn response(id: impl Into<NachrichtenId>, result: Value) -> Self {
        Self::Response(ResponseMessage {
            id: id.into(),
            result,
        })
    }

    /// Erstellt eine Fehler-Antwort
    pub fn response_error(
        id: impl Into<NachrichtenId>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ResponseError(ResponseErrorMessage {
            id: id.into(),
            code: code.into(),
            message: message.into(),
            params: Vec::new(),
        })
    }

    /// Erstellt eine Benachrichtigung
    pub fn notification(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Notification(NotificationMessage {
            method: method.into(),
            params,
            target: None,
            origin: None,
        })
    }

    /// Kurzname der Nachrichtenart fuer Logs
    pub fn art(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::ResponseError(_) => "responseError",
            Self::Notification(_) => "notification",
            Self::Broadcast(_) => "broadcast",
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Methoden-Namen die der Server selbst versendet
// ---------------------------------------------------------------------------

/// Methoden der Raum- und Peer-Verwaltung
pub mod methoden {
    /// Server -> neuer Peer: eigene Identitaet, Host und Gaeste
    pub const PEER_INFO: &str = "peer/info";
    /// Server -> Host: ein Benutzer moechte beitreten (Request)
    pub const PEER_JOIN_REQUEST: &str = "peer/joinRequest";
    /// Server -> uebrige Peers: ein Peer ist beigetreten
    pub const ROOM_JOINED: &str = "room/joined";
    /// Server -> uebrige Peers: ein Peer hat den Raum verlassen
    pub const ROOM_LEFT: &str = "room/left";
    /// Server -> alle Peers: der Raum wurde geschlossen
    pub const ROOM_CLOSED: &str = "room/closed";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
