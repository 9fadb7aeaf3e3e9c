//! Standard-Backend: RSA-OAEP (SHA-256) + AES-256-CBC (PKCS#7)
//!
//! ## Formate
//! - Oeffentlicher Schluessel: Base64 von SPKI-DER
//! - Privater Schluessel: Base64 von PKCS#8-DER
//! - Symmetrischer Schluessel: Base64 von 32 Rohbytes
//! - IV: Base64 von 16 Rohbytes

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand_core::{OsRng, RngCore};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::provider::CryptoBackend;
use crate::types::{KeyPair, SecretBytes, SecretString};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Modulus-Laenge fuer produktive Schluessel
pub const RSA_BITS: usize = 4096;
pub const SYM_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// RSA-OAEP/AES-CBC-Backend
#[derive(Debug, Clone)]
pub struct RsaAesBackend {
    rsa_bits: usize,
}

impl RsaAesBackend {
    pub fn neu() -> Self {
        Self { rsa_bits: RSA_BITS }
    }

    /// Backend mit abweichender Modulus-Laenge (z.B. 2048 fuer Tests)
    pub fn mit_rsa_bits(rsa_bits: usize) -> Self {
        Self { rsa_bits }
    }
}

impl Default for RsaAesBackend {
    fn default() -> Self {
        Self::neu()
    }
}

fn dekodieren_mit_laenge(b64: &str, erwartet: usize) -> CryptoResult<SecretBytes> {
    let bytes = SecretBytes::new(STANDARD.decode(b64)?);
    if bytes.len() != erwartet {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet,
            erhalten: bytes.len(),
        });
    }
    Ok(bytes)
}

fn zufall(laenge: usize) -> SecretBytes {
    let mut bytes = vec![0u8; laenge];
    OsRng.fill_bytes(&mut bytes);
    SecretBytes::new(bytes)
}

impl CryptoBackend for RsaAesBackend {
    fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        let privat = RsaPrivateKey::new(&mut OsRng, self.rsa_bits)
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;
        let oeffentlich = RsaPublicKey::from(&privat);

        let privat_der = privat
            .to_pkcs8_der()
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;
        let oeffentlich_der = oeffentlich
            .to_public_key_der()
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;

        Ok(KeyPair {
            public_key: STANDARD.encode(oeffentlich_der.as_bytes()),
            private_key: SecretString::new(STANDARD.encode(privat_der.as_bytes())),
        })
    }

    fn generate_sym_key(&self) -> CryptoResult<String> {
        Ok(STANDARD.encode(zufall(SYM_KEY_LEN).as_bytes()))
    }

    fn generate_iv(&self) -> CryptoResult<String> {
        Ok(STANDARD.encode(zufall(IV_LEN).as_bytes()))
    }

    fn sym_encrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>> {
        let key = dekodieren_mit_laenge(schluessel, SYM_KEY_LEN)?;
        let iv = dekodieren_mit_laenge(iv, IV_LEN)?;
        let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(daten))
    }

    fn sym_decrypt(&self, daten: &[u8], schluessel: &str, iv: &str) -> CryptoResult<Vec<u8>> {
        let key = dekodieren_mit_laenge(schluessel, SYM_KEY_LEN)?;
        let iv = dekodieren_mit_laenge(iv, IV_LEN)?;
        let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
            .map_err(|e| CryptoError::Entschluesselung(e.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(daten)
            .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
    }

    fn public_encrypt(&self, daten: &[u8], public_key: &str) -> CryptoResult<Vec<u8>> {
        let der = STANDARD.decode(public_key)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::UngueltigerSchluessel(e.to_string()))?;
        key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), daten)
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
    }

    fn private_decrypt(&self, daten: &[u8], private_key: &str) -> CryptoResult<Vec<u8>> {
        let der = SecretBytes::new(STANDARD.decode(private_key)?);
        let key = RsaPrivateKey::from_pkcs8_der(der.as_bytes())
            .map_err(|e| CryptoError::UngueltigerSchluessel(e.to_string()))?;
        key.decrypt(Oaep::new::<Sha256>(), daten)
            .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
    }
}
