//! CryptoProvider mit austauschbarem Backend
//!
//! Das Backend muss vor der ersten Verwendung gesetzt werden, entweder
//! global ueber [`backend_setzen`] oder explizit ueber
//! [`CryptoProvider::mit_backend`]. Ohne Backend liefert jede Operation
//! [`CryptoError::CryptoUnavailable`].
//!
//! Alle Schluessel, IVs und oeffentliche Schluessel werden als Base64-Strings
//! uebergeben, Nutzdaten als Bytes.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{CryptoError, CryptoResult};
use crate::types::KeyPair;

/// Primitive die ein Backend bereitstellen muss
pub trait CryptoBackend: Send + Sync {
    /// Erzeugt ein frisches asymmetrisches Schluessel-Paar
    fn generate_key_pair(&self) -> CryptoResult<KeyPair>;

    /// Erzeugt einen frischen symmetrischen Schluessel (Base64)
    fn generate_sym_key(&self) -> CryptoResult<String>;

    /// Erzeugt einen frischen IV (Base64)
    fn generate_iv(&self) -> CryptoResult<String>;

    fn sym_encrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>>;

    fn sym_decrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>>;

    /// Verschluesselt kleine Daten (symmetrische Schluessel) fuer einen Empfaenger
    fn public_encrypt(&self, daten: &[u8], public_key: &str) -> CryptoResult<Vec<u8>>;

    fn private_decrypt(&self, daten: &[u8], private_key: &str) -> CryptoResult<Vec<u8>>;
}

static GLOBALES_BACKEND: RwLock<Option<Arc<dyn CryptoBackend>>> = parking_lot::const_rwlock(None);

/// Setzt das prozessweite Backend (ersetzt ein vorher gesetztes)
pub fn backend_setzen(backend: Arc<dyn CryptoBackend>) {
    *GLOBALES_BACKEND.write() = Some(backend);
    tracing::debug!("Krypto-Backend gesetzt");
}

/// Handle auf ein Backend
#[derive(Clone, Default)]
pub struct CryptoProvider {
    backend: Option<Arc<dyn CryptoBackend>>,
}

impl CryptoProvider {
    /// Provider mit explizitem Backend
    pub fn mit_backend(backend: Arc<dyn CryptoBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Provider ohne Backend, jede Operation schlaegt fehl
    pub fn unkonfiguriert() -> Self {
        Self { backend: None }
    }

    /// Provider auf dem aktuell gesetzten globalen Backend
    pub fn global() -> Self {
        Self {
            backend: GLOBALES_BACKEND.read().clone(),
        }
    }

    pub fn ist_konfiguriert(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> CryptoResult<&dyn CryptoBackend> {
        self.backend.as_deref().ok_or(CryptoError::CryptoUnavailable)
    }

    pub fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        self.backend()?.generate_key_pair()
    }

    pub fn generate_sym_key(&self) -> CryptoResult<String> {
        self.backend()?.generate_sym_key()
    }

    pub fn generate_iv(&self) -> CryptoResult<String> {
        self.backend()?.generate_iv()
    }

    pub fn sym_encrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>> {
        self.backend()?.sym_encrypt(daten, schluessel, iv)
    }

    pub fn sym_decrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>> {
        self.backend()?.sym_decrypt(daten, schluessel, iv)
    }

    pub fn public_encrypt(&self, daten: &[u8], public_key: &str) -> CryptoResult<Vec<u8>> {
        self.backend()?.public_encrypt(daten, public_key)
    }

    pub fn private_decrypt(&self, daten: &[u8], private_key: &str) -> CryptoResult<Vec<u8>> {
        self.backend()?.private_decrypt(daten, private_key)
    }
}

impl std::fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("konfiguriert", &self.ist_konfiguriert())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ohne_backend_crypto_unavailable() {
        let p = CryptoProvider::unkonfiguriert();
        assert!(matches!(p.generate_sym_key(), Err(CryptoError::CryptoUnavailable)));
        assert!(matches!(
            p.sym_encrypt(b"x", "k", "iv"),
            Err(CryptoError::CryptoUnavailable)
        ));
        assert!(matches!(p.generate_key_pair(), Err(CryptoError::CryptoUnavailable)));
    }
}
