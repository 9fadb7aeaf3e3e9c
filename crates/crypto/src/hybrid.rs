//! Hybride Verschluesselung von Broadcasts
//!
//! Die Parameter eines Broadcasts werden einmal mit einem frischen
//! AES-Schluessel verschluesselt (`params = [{iv, data}]`). Nur dieser
//! Schluessel wird pro Empfaenger mit dessen oeffentlichem Schluessel
//! verpackt (`metadata.encryption.keys`). Ein weiterer Empfaenger kostet
//! damit genau eine asymmetrische Operation.

use base64::{engine::general_purpose::STANDARD, Engine};
use oct_core::PeerId;
use oct_protocol::messages::{
    BroadcastMessage, BroadcastMetadata, EncryptedContent, EncryptedKey, EncryptionMetadata,
};
use serde_json::Value;

use crate::error::{CryptoError, CryptoResult};
use crate::provider::CryptoProvider;
use crate::types::SecretBytes;

/// Empfaenger eines verschluesselten Broadcasts
#[derive(Debug, Clone)]
pub struct Empfaenger {
    pub peer: PeerId,
    /// Base64 SPKI des Empfaengers
    pub public_key: String,
}

/// Baut einen verschluesselten Broadcast fuer alle `empfaenger`
///
/// Ohne Empfaenger entsteht ein Broadcast mit leerer Schluesselliste,
/// der als unverschluesselt gelten wuerde. Aufrufer pruefen das vorher.
pub fn broadcast_verschluesseln(
    provider: &CryptoProvider,
    method: impl Into<String>,
    params: &[Value],
    empfaenger: &[Empfaenger],
) -> CryptoResult<BroadcastMessage> {
    let sym_key = provider.generate_sym_key()?;
    let iv = provider.generate_iv()?;

    let klartext = serde_json::to_vec(params)?;
    let daten = provider.sym_encrypt(&klartext, &sym_key, &iv)?;

    let roh_key = SecretBytes::new(STANDARD.decode(&sym_key)?);
    let mut keys = Vec::with_capacity(empfaenger.len());
    for e in empfaenger {
        let verpackt = provider.public_encrypt(roh_key.as_bytes(), &e.public_key)?;
        keys.push(EncryptedKey {
            target: e.peer,
            key: STANDARD.encode(verpackt),
        });
    }

    let inhalt = EncryptedContent {
        iv,
        data: STANDARD.encode(daten),
    };

    Ok(BroadcastMessage {
        origin: None,
        method: method.into(),
        params: vec![serde_json::to_value(inhalt)?],
        metadata: BroadcastMetadata {
            encryption: EncryptionMetadata { keys },
        },
    })
}

/// Entschluesselt die Parameter eines empfangenen Broadcasts
///
/// Unverschluesselte Broadcasts werden unveraendert zurueckgegeben.
pub fn broadcast_entschluesseln(
    provider: &CryptoProvider,
    nachricht: &BroadcastMessage,
    eigene_id: &PeerId,
    private_key: &str,
) -> CryptoResult<Vec<Value>> {
    if !nachricht.ist_verschluesselt() {
        return Ok(nachricht.params.clone());
    }

    let eintrag = nachricht.schluessel_fuer(eigene_id).ok_or_else(|| {
        CryptoError::UngueltigeDaten(format!("Kein Schluessel fuer {eigene_id}"))
    })?;
    let inhalt = nachricht
        .verschluesselter_inhalt()
        .ok_or_else(|| CryptoError::UngueltigeDaten("Kein verschluesselter Inhalt".into()))?;

    let roh_key =
        SecretBytes::new(provider.private_decrypt(&STANDARD.decode(&eintrag.key)?, private_key)?);
    let sym_key = STANDARD.encode(roh_key.as_bytes());

    let klartext = provider.sym_decrypt(&STANDARD.decode(&inhalt.data)?, &sym_key, &inhalt.iv)?;
    Ok(serde_json::from_slice(&klartext)?)
}
