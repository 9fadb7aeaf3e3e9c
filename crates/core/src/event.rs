//! Beobachter-Registry fuer Ereignisse
//!
//! Ersetzt lose Callback-Emitter durch eine explizite Registrierung.
//!
//! ## Zustellgarantien
//! - Beobachter werden in Registrierungsreihenfolge benachrichtigt
//! - Ein fehlschlagender (oder panischer) Beobachter wird geloggt und
//!   haelt die uebrigen Beobachter nicht auf
//! - Die Verteilung arbeitet auf einem Schnappschuss der Liste; waehrend
//!   der Verteilung kann registriert und entfernt werden

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Empfaenger von Ereignissen des Typs `E`
pub trait Beobachter<E>: Send + Sync {
    /// Verarbeitet ein Ereignis
    fn benachrichtigen(&self, ereignis: &E) -> Result<()>;
}

impl<E, F> Beobachter<E> for F
where
    F: Fn(&E) -> Result<()> + Send + Sync,
{
    fn benachrichtigen(&self, ereignis: &E) -> Result<()> {
        self(ereignis)
    }
}

/// Handle einer Registrierung, wird zum Abmelden benoetigt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeobachterId(u64);

/// Registry aller Beobachter eines Ereignistyps
pub struct BeobachterRegistry<E> {
    naechste_id: AtomicU64,
    beobachter: RwLock<Vec<(BeobachterId, Arc<dyn Beobachter<E>>)>>,
}

impl<E> BeobachterRegistry<E> {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self {
            naechste_id: AtomicU64::new(1),
            beobachter: RwLock::new(Vec::new()),
        }
    }

    /// Registriert einen Beobachter am Ende der Liste
    pub fn registrieren(&self, beobachter: Arc<dyn Beobachter<E>>) -> BeobachterId {
        let id = BeobachterId(self.naechste_id.fetch_add(1, Ordering::Relaxed));
        self.beobachter.write().push((id, beobachter));
        id
    }

    /// Entfernt einen Beobachter. Gibt `false` zurueck wenn er nicht (mehr) registriert war.
    pub fn entfernen(&self, id: BeobachterId) -> bool {
        let mut liste = self.beobachter.write();
        let vorher = liste.len();
        liste.retain(|(eid, _)| *eid != id);
        liste.len() != vorher
    }

    /// Anzahl registrierter Beobachter
    pub fn anzahl(&self) -> usize {
        self.beobachter.read().len()
    }

    /// Verteilt ein Ereignis an alle Beobachter
    ///
    /// Gibt die Anzahl fehlgeschlagener Beobachter zurueck.
    pub fn verteilen(&self, ereignis: &E) -> usize {
        let schnappschuss: Vec<_> = self.beobachter.read().clone();

        let mut fehlgeschlagen = 0;
        for (id, beobachter) in schnappschuss {
            let ergebnis = catch_unwind(AssertUnwindSafe(|| beobachter.benachrichtigen(ereignis)))
                .unwrap_or_else(|_| Err(CoreError::Beobachter("Panik im Beobachter".into())));
            if let Err(e) = ergebnis {
                fehlgeschlagen += 1;
                tracing::warn!(beobachter = id.0, fehler = %e, "Beobachter fehlgeschlagen");
            }
        }
        fehlgeschlagen
    }
}

impl<E> Default for BeobachterRegistry<E> {
    fn default() -> Self {
        Self::neu()
    }
}
