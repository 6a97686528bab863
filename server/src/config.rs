//! Bot-Konfiguration
//!
//! Wird beim Start einmalig aus einer TOML-Datei geladen und geprueft.
//! Ohne Datei gibt es keine Kategorien und damit nichts zu tun, eine
//! fehlende Datei ist deshalb ein Fehler.

use anyhow::{Context, bail};
use autokanal_engine::{CategoryConfig, CoordinatorOptionen};
use autokanal_observability::logging::{log_format_gueltig, log_level_gueltig};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Vollstaendige Bot-Konfiguration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Zugangsdaten
    pub general: AllgemeineEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Laufzeit des Abgleichs
    pub reconcile: AbgleichEinstellungen,
    /// Verwaltete Kategorien, Schluessel ist der Handler-Name
    pub categories: BTreeMap<String, CategoryConfig>,
}

/// Allgemeine Einstellungen
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AllgemeineEinstellungen {
    /// Bot-Token, wird nur an den Plattform-Adapter durchgereicht
    pub token: String,
}

impl fmt::Debug for AllgemeineEinstellungen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllgemeineEinstellungen")
            .field("token", &"***")
            .finish()
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Deserialize)]
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
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    #[serde(rename = "enabled")]
    pub aktiviert: bool,
    #[serde(rename = "bind_address")]
    pub bind_adresse: String,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            bind_adresse: "0.0.0.0".into(),
            port: 9300,
        }
    }
}

/// Laufzeit-Einstellungen des Abgleichs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbgleichEinstellungen {
    /// Maximale Wartezeit auf eine Kanal-Sperre in Sekunden
    pub lock_timeout_secs: u64,
    /// Obergrenze gleichzeitig verarbeiteter Ereignisse pro Kategorie
    pub max_concurrent_events: usize,
}

impl Default for AbgleichEinstellungen {
    fn default() -> Self {
        let optionen = CoordinatorOptionen::default();
        Self {
            lock_timeout_secs: optionen.sperr_zeitlimit.as_secs(),
            max_concurrent_events: optionen.max_gleichzeitige_ereignisse,
        }
    }
}

impl BotConfig {
    /// Laedt und prueft die Konfiguration aus einer TOML-Datei
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let inhalt = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => inhalt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("Konfigurationsdatei '{pfad}' nicht gefunden");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"));
            }
        };
        let config = Self::aus_toml(&inhalt)
            .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?;
        Ok(config)
    }

    /// Parst und prueft eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    /// Prueft alle Abschnitte, bevor irgendeine Kategorie startet
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            bail!("logging.level '{}' ist ungueltig", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("logging.format '{}' ist ungueltig", self.logging.format);
        }
        if self.reconcile.lock_timeout_secs == 0 {
            bail!("reconcile.lock_timeout_secs muss mindestens 1 sein");
        }
        if self.reconcile.max_concurrent_events == 0 {
            bail!("reconcile.max_concurrent_events muss mindestens 1 sein");
        }
        if self.observability.aktiviert {
            self.observability_bind_adresse()?;
        }

        if self.categories.is_empty() {
            bail!("keine Kategorien konfiguriert");
        }
        let mut gesehen = HashMap::new();
        for (schluessel, kategorie) in &self.categories {
            kategorie
                .validieren()
                .with_context(|| format!("categories.{schluessel}"))?;
            if let Some(anderer) = gesehen.insert(kategorie.category_id, schluessel) {
                bail!(
                    "categories.{anderer} und categories.{schluessel} verwalten dieselbe Kategorie {}",
                    kategorie.category_id
                );
            }
        }
        Ok(())
    }

    /// Laufzeit-Optionen fuer jeden Koordinator
    pub fn koordinator_optionen(&self) -> CoordinatorOptionen {
        CoordinatorOptionen {
            sperr_zeitlimit: Duration::from_secs(self.reconcile.lock_timeout_secs),
            max_gleichzeitige_ereignisse: self.reconcile.max_concurrent_events,
        }
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.observability.bind_adresse, self.observability.port);
        adresse
            .parse()
            .with_context(|| format!("observability.bind_address '{adresse}' ist ungueltig"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autokanal_core::ChannelId;
    use autokanal_engine::AutoVoicePermissions;

    const BEISPIEL: &str = r#"
        [general]
        token = "geheim"

        [logging]
        level = "debug"

        [observability]
        enabled = true
        port = 9400

        [categories.gaming]
        categoryId = "123456789012345678"
        autoText = true
        autoVoice = true
        autoVoicePrefix = "Talk"
        autoVoiceChannelLimit = 5
        autoVoicePermissions = "sync"

        [categories.musik]
        categoryId = 42
        autoVoice = true
    "#;

    #[test]
    fn config_aus_toml_string() {
        let cfg = BotConfig::aus_toml(BEISPIEL).unwrap();
        assert_eq!(cfg.general.token, "geheim");
        assert_eq!(cfg.logging.level, "debug");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.logging.format, "text");
        assert_eq!(cfg.reconcile.lock_timeout_secs, 30);
        assert_eq!(cfg.reconcile.max_concurrent_events, 64);

        let gaming = &cfg.categories["gaming"];
        assert_eq!(gaming.category_id, ChannelId(123_456_789_012_345_678));
        assert_eq!(gaming.auto_voice_channel_limit, 5);
        assert!(matches!(gaming.auto_voice_permissions, AutoVoicePermissions::Modus(_)));
        assert_eq!(cfg.categories["musik"].auto_voice_prefix, "Voice");
    }

    #[test]
    fn bind_adresse_und_optionen() {
        let cfg = BotConfig::aus_toml(BEISPIEL).unwrap();
        assert_eq!(cfg.observability_bind_adresse().unwrap().to_string(), "0.0.0.0:9400");
        let optionen = cfg.koordinator_optionen();
        assert_eq!(optionen.sperr_zeitlimit, Duration::from_secs(30));
        assert_eq!(optionen.max_gleichzeitige_ereignisse, 64);
    }

    #[test]
    fn token_erscheint_nicht_im_debug() {
        let cfg = BotConfig::aus_toml(BEISPIEL).unwrap();
        let ausgabe = format!("{cfg:?}");
        assert!(!ausgabe.contains("geheim"));
    }

    #[test]
    fn ohne_kategorien_ungueltig() {
        let e = BotConfig::aus_toml("[general]\ntoken = \"x\"\n").unwrap_err();
        assert!(e.to_string().contains("keine Kategorien"));
    }

    #[test]
    fn ungueltige_kategorie_nennt_schluessel() {
        let toml = r#"
            [categories.kaputt]
            categoryId = 7
            autoVoiceBitrate = 1000
        "#;
        let e = BotConfig::aus_toml(toml).unwrap_err();
        assert!(format!("{e:#}").contains("categories.kaputt"));
    }

    #[test]
    fn doppelte_kategorie_ungueltig() {
        let toml = r#"
            [categories.a]
            categoryId = 7
            [categories.b]
            categoryId = 7
        "#;
        let e = BotConfig::aus_toml(toml).unwrap_err();
        assert!(e.to_string().contains("dieselbe Kategorie"));
    }

    #[test]
    fn unbekanntes_feld_in_kategorie_ungueltig() {
        let toml = r#"
            [categories.a]
            categoryId = 7
            autoVoiceLimit = 3
        "#;
        assert!(BotConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn ungueltiges_log_format() {
        let toml = r#"
            [logging]
            format = "xml"
            [categories.a]
            categoryId = 7
        "#;
        assert!(BotConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn fehlende_datei_ist_fehler() {
        let e = BotConfig::laden("/nicht/vorhanden/autokanal.toml").unwrap_err();
        assert!(e.to_string().contains("nicht gefunden"));
    }
}
