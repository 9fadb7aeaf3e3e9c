//! oct-protocol: Protokoll-Definitionen fuer den OCT-Relay
//!
//! - [`messages`] Umschlaege die nach dem Handshake ausgetauscht werden
//! - [`info`] strukturierte Status- und Fehlerinformation
//! - [`types`] DTOs der HTTP-Control-Plane
//! - [`version`] Protokollversion und Kompatibilitaetsregel
//! - [`transport`] Transport-Traits und Header-Namen

pub mod info;
pub mod messages;
pub mod transport;
pub mod types;
pub mod version;

pub use info::Info;
pub use messages::{
    BroadcastMessage, EncryptedContent, EncryptedKey, Message, NachrichtenId,
    NotificationMessage, RequestMessage, ResponseErrorMessage, ResponseMessage,
};
pub use transport::{MessageTransport, TransportError, TransportProvider, TransportVerbindung};
pub use version::{kompatibel, protokoll_version, PROTOKOLL_VERSION};
