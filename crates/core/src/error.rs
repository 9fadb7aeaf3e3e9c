//! Fehlertypen fuer oct-core
//!
//! Untermodule der anderen Crates definieren eigene Fehler und
//! konvertieren via `#[from]`.

use thiserror::Error;

/// Result-Alias fuer oct-core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Fehler die in den gemeinsamen Bausteinen auftreten koennen
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Ungueltige ID: {0}")]
    UngueltigeId(String),

    #[error("Beobachter fehlgeschlagen: {0}")]
    Beobachter(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
