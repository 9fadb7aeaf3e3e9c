//! oct-core – Gemeinsame Typen, Fehlertypen und Beobachter-Registry
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von Relay,
//! Client und Server gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{CoreError, Result};
pub use event::{Beobachter, BeobachterId, BeobachterRegistry};
pub use types::{PeerId, RoomId};
