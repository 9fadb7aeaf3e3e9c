//! Zusammenfuehren von Abbruch-Signalen
//!
//! Das zusammengefuehrte Signal feuert sobald eine der Quellen feuert.
//! Ist eine Quelle beim Zusammenfuehren bereits ausgeloest, wird direkt
//! diese zurueckgegeben und kein Beobachter-Task gestartet.

use futures_util::future::select_all;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Zusammengefuehrtes Abbruch-Signal
///
/// Beim Drop endet der interne Beobachter-Task.
pub struct Abbruch {
    token: CancellationToken,
    _ende: Option<DropGuard>,
}

impl Abbruch {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn ist_abgebrochen(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Fuehrt mehrere Signale zusammen ("wer zuerst feuert gewinnt")
pub fn zusammenfuehren(quellen: &[&CancellationToken]) -> Abbruch {
    if let Some(ausgeloest) = quellen.iter().find(|q| q.is_cancelled()) {
        return Abbruch {
            token: (*ausgeloest).clone(),
            _ende: None,
        };
    }

    let token = CancellationToken::new();
    if quellen.is_empty() {
        return Abbruch {
            token,
            _ende: None,
        };
    }

    let quellen: Vec<CancellationToken> = quellen.iter().map(|q| (*q).clone()).collect();
    let ziel = token.clone();
    tokio::spawn(async move {
        let signale = quellen.iter().map(|q| Box::pin(q.cancelled()));
        tokio::select! {
            _ = select_all(signale) => ziel.cancel(),
            _ = ziel.cancelled() => {}
        }
    });

    Abbruch {
        _ende: Some(token.clone().drop_guard()),
        token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bereits_ausgeloeste_quelle_wird_direkt_verwendet() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        b.cancel();
        let z = zusammenfuehren(&[&a, &b]);
        assert!(z.ist_abgebrochen());
        assert!(!a.is_cancelled());
    }

    #[tokio::test]
    async fn erste_quelle_gewinnt() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let z = zusammenfuehren(&[&a, &b]);
        assert!(!z.ist_abgebrochen());
        b.cancel();
        z.token().cancelled().await;
        assert!(!a.is_cancelled());
    }

    #[tokio::test]
    async fn drop_loest_quellen_nicht_aus() {
        let a = CancellationToken::new();
        let z = zusammenfuehren(&[&a]);
        drop(z);
        tokio::task::yield_now().await;
        assert!(!a.is_cancelled());
    }
}
