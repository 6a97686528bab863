//! Fehlertypen fuer den Plattform-Adapter

use autokanal_core::{ChannelId, MemberId};
use thiserror::Error;

/// Fehler, die ein Plattform-Aufruf liefern kann
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Kanal nicht gefunden: {0}")]
    KanalNichtGefunden(ChannelId),

    #[error("Mitglied nicht gefunden: {0}")]
    MitgliedNichtGefunden(MemberId),

    #[error("Operation '{operation}' abgelehnt: {grund}")]
    Abgelehnt { operation: &'static str, grund: String },

    #[error("Verbindung zur Plattform fehlgeschlagen: {0}")]
    Verbindung(String),
}

impl PlatformError {
    /// Erstellt einen Ablehnungsfehler fuer eine Operation
    pub fn abgelehnt(operation: &'static str, grund: impl Into<String>) -> Self {
        Self::Abgelehnt {
            operation,
            grund: grund.into(),
        }
    }

    /// True wenn die referenzierte Ressource nicht (mehr) existiert
    pub fn ist_nicht_gefunden(&self) -> bool {
        matches!(
            self,
            Self::KanalNichtGefunden(_) | Self::MitgliedNichtGefunden(_)
        )
    }
}

/// Result-Typ fuer Plattform-Aufrufe
pub type PlatformResult<T> = Result<T, PlatformError>;
