//! # oct-crypto
//!
//! Hybride Ende-zu-Ende Verschluesselung fuer den OCT-Relay.
//!
//! ## Module
//! - `provider` - CryptoProvider mit austauschbarem Backend
//! - `rsa_aes` - Standard-Backend (RSA-OAEP/SHA-256 + AES-256-CBC)
//! - `hybrid` - Verschluesselung von Broadcasts pro Empfaenger
//! - `types` - KeyPair und Geheimnis-Container
//! - `error` - Fehlertypen
//!
//! Der Relay selbst entschluesselt nie, er verwendet nur die Schluesselliste
//! eines Broadcasts zur Verteilung.

pub mod error;
pub mod hybrid;
pub mod provider;
pub mod rsa_aes;
pub mod types;

use std::sync::Arc;

pub use error::{CryptoError, CryptoResult};
pub use hybrid::{broadcast_entschluesseln, broadcast_verschluesseln, Empfaenger};
pub use provider::{backend_setzen, CryptoBackend, CryptoProvider};
pub use rsa_aes::RsaAesBackend;
pub use types::{KeyPair, SecretBytes, SecretString};

/// Setzt das Standard-Backend als globales Backend
pub fn initialisieren() {
    backend_setzen(Arc::new(RsaAesBackend::neu()));
}
