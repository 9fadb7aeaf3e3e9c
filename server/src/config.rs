//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "OCT_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Timeouts)
    pub relay: RelayEinstellungen,
    /// Login- und Beitritts-Sitzungen
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Betreiber, wird in `/api/meta` ausgeliefert
    pub betreiber: Option<String>,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "OCT Relay".into(),
            betreiber: None,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub port: u16,
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8100,
            cors_origins: vec![],
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Timeout fuer weitergeleitete Anfragen in Millisekunden
    pub anfrage_timeout_ms: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            anfrage_timeout_ms: 30_000,
        }
    }
}

/// Login- und Beitritts-Sitzungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Gueltigkeit eines Login-Tokens in Sekunden
    pub login_ttl_sekunden: i64,
    /// Gueltigkeit offener Poll-Tokens und Raum-Tokens in Sekunden
    pub token_ttl_sekunden: i64,
    /// Wie lange ein Poll ohne Ergebnis gehalten wird bevor 204 kommt
    pub poll_halten_ms: u64,
    /// Wartezeit auf die Entscheidung des Hosts bei einem Beitritt
    pub beitritt_timeout_ms: u64,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        Self {
            login_ttl_sekunden: 7 * 24 * 60 * 60,
            token_ttl_sekunden: 10 * 60,
            poll_halten_ms: 10_000,
            beitritt_timeout_ms: 5 * 60 * 1000,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den separaten Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !oct_observability::logging::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level: {}", self.logging.level);
        }
        if !oct_observability::logging::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: {}", self.logging.format);
        }
        if self.relay.anfrage_timeout_ms == 0 {
            anyhow::bail!("relay.anfrage_timeout_ms muss groesser 0 sein");
        }
        Ok(())
    }

    /// Bind-Adresse fuer HTTP und WebSocket
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    pub fn anfrage_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.anfrage_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.netzwerk.port, 8100);
        assert_eq!(cfg.anfrage_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:8100");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Relay"
            betreiber = "Team A"

            [relay]
            anfrage_timeout_ms = 5000
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Relay");
        assert_eq!(cfg.server.betreiber.as_deref(), Some("Team A"));
        assert_eq!(cfg.anfrage_timeout(), Duration::from_secs(5));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.port, 8100);
        assert_eq!(cfg.sitzung.poll_halten_ms, 10_000);
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.relay.anfrage_timeout_ms = 0;
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/config.toml").unwrap();
        assert_eq!(cfg.server.name, "OCT Relay");
    }
}
