//! Fehlertypen fuer die Abgleich-Engine
//!
//! Alle Arten ausser `Konfiguration` sind pro Ereignis behebbar: der
//! Abgleich wird protokolliert und beim naechsten Ereignis erneut abgeleitet.

use autokanal_core::{AutokanalError, ChannelId};
use autokanal_platform::PlatformError;
use std::time::Duration;
use thiserror::Error;

/// Fehler eines Abgleichs
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Die Kanal-Sperre wurde nicht rechtzeitig frei
    #[error("Sperre fuer {schluessel} nach {wartezeit:?} nicht erhalten")]
    SperreZeitlimit {
        schluessel: ChannelId,
        wartezeit: Duration,
    },

    /// Ein referenzierter Kanal existiert nicht mehr
    #[error("Kanal nicht gefunden: {0}")]
    KanalNichtGefunden(ChannelId),

    /// Anlegen, Loeschen oder Berechtigungsaenderung ist fehlgeschlagen
    #[error("Plattform-Operation fehlgeschlagen: {0}")]
    Plattform(#[source] PlatformError),

    /// Ungueltige Kategorie-Konfiguration (nur beim Start)
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl ReconcileError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Kurzname fuer Logs und Metrik-Labels
    pub fn art(&self) -> &'static str {
        match self {
            Self::SperreZeitlimit { .. } => "lock_timeout",
            Self::KanalNichtGefunden(_) => "channel_not_found",
            Self::Plattform(_) => "platform",
            Self::Konfiguration(_) => "configuration",
        }
    }

    /// True wenn der Fehler nur das aktuelle Ereignis betrifft
    pub fn ist_wiederholbar(&self) -> bool {
        !matches!(self, Self::Konfiguration(_))
    }
}

impl From<PlatformError> for ReconcileError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::KanalNichtGefunden(id) => Self::KanalNichtGefunden(id),
            andere => Self::Plattform(andere),
        }
    }
}

impl From<ReconcileError> for AutokanalError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Konfiguration(msg) => AutokanalError::Konfiguration(msg),
            ReconcileError::SperreZeitlimit { .. } => AutokanalError::Zeitlimit(e.to_string()),
            andere => AutokanalError::Plattform(andere.to_string()),
        }
    }
}

/// Result-Typ der Abgleich-Engine
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nicht_gefunden_wird_eigene_art() {
        let e: ReconcileError = PlatformError::KanalNichtGefunden(ChannelId(5)).into();
        assert!(matches!(e, ReconcileError::KanalNichtGefunden(ChannelId(5))));
        assert_eq!(e.art(), "channel_not_found");

        let e: ReconcileError = PlatformError::abgelehnt("kanal_loeschen", "Missing Access").into();
        assert_eq!(e.art(), "platform");
    }

    #[test]
    fn nur_konfiguration_ist_fatal() {
        let zeitlimit = ReconcileError::SperreZeitlimit {
            schluessel: ChannelId(1),
            wartezeit: Duration::from_secs(30),
        };
        assert!(zeitlimit.ist_wiederholbar());
        assert!(zeitlimit.to_string().contains("channel:1"));
        assert!(!ReconcileError::konfiguration("x").ist_wiederholbar());
    }

    #[test]
    fn umwandlung_in_prozessfehler() {
        let e: AutokanalError = ReconcileError::konfiguration("limit = 0").into();
        assert!(e.ist_fatal());
    }
}
