//! # oct-relay
//!
//! Serverseitiger Nachrichten-Relay fuer OCT-Raeume.
//!
//! ## Module
//! - `relay` - MessageRelay: Request-Korrelation, Timeouts, Broadcast-Verteilung
//! - `room` - Raum mit Host und Peer-Menge
//! - `peer` - Peer-Eintrag und Send-Queue
//! - `manager` - RoomManager: Beitritt, Verlassen, Schliessen, Ereignisse
//! - `error` - Fehlertypen

pub mod error;
pub mod manager;
pub mod peer;
pub mod relay;
pub mod room;

pub use error::{RelayError, RelayResult};
pub use manager::{RaumEreignis, RoomManager};
pub use peer::{Peer, PeerChannel};
pub use relay::{BroadcastBericht, MessageRelay, RelayMetriken, STANDARD_TIMEOUT};
pub use room::Room;
