//! Gemeinsame Identifikationstypen
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Peer- und Raum-IDs zur Compilezeit auszuschliessen. Auf dem Draht
//! werden sie als nackter UUID-String serialisiert.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Eindeutige Peer-ID (raumweit eindeutig)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Erstellt eine neue zufaellige PeerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CoreError::UngueltigeId(s.to_string()))
    }
}

/// Eindeutige Raum-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Erstellt eine neue zufaellige RoomId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room:{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CoreError::UngueltigeId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_eindeutig() {
        let a = PeerId::new();
        let b = PeerId::new();
        assert_ne!(a, b, "Zwei neue PeerIds muessen verschieden sein");
    }

    #[test]
    fn room_id_display() {
        let id = RoomId(Uuid::nil());
        assert!(id.to_string().starts_with("room:"));
    }

    #[test]
    fn ids_werden_als_nackter_string_serialisiert() {
        let pid = PeerId(Uuid::nil());
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let zurueck: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, zurueck);
    }

    #[test]
    fn room_id_aus_url_segment() {
        let id = RoomId::new();
        let geparst: RoomId = id.inner().to_string().parse().unwrap();
        assert_eq!(id, geparst);
        assert!("kein-uuid".parse::<RoomId>().is_err());
    }
}
