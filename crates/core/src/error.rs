//! Fehlertypen fuer Autokanal
//!
//! Zentraler Fehler-Enum fuer die Prozessebene. Die Abgleich-Engine
//! definiert eigene Fehler und konvertiert sie beim Start der Kategorien
//! hierher; `ist_fatal()` entscheidet, ob der Bot abbricht.

use thiserror::Error;

/// Globaler Result-Alias fuer Autokanal
pub type Result<T> = std::result::Result<T, AutokanalError>;

/// Fehler auf Prozessebene
#[derive(Debug, Error)]
pub enum AutokanalError {
    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Plattform ---
    #[error("Plattform nicht erreichbar: {0}")]
    Plattform(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),
}

impl AutokanalError {
    /// Gibt true zurueck wenn der Fehler den Prozessstart verhindern muss
    pub fn ist_fatal(&self) -> bool {
        matches!(self, Self::Konfiguration(_))
    }
}
