//! Gemeinsame Identifikationstypen fuer Autokanal
//!
//! Die Chat-Plattform vergibt numerische Snowflake-IDs. Das Newtype-Pattern
//! verhindert Verwechslungen zwischen Kanal-, Mitglieds- und Rollen-IDs zur
//! Compilezeit.

use serde::{Deserialize, Serialize};

/// Eindeutige Kanal-ID (auch Kategorien sind Kanaele)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Gibt die rohe Snowflake-ID zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

/// Eindeutige Mitglieds-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl MemberId {
    /// Gibt die rohe Snowflake-ID zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "member:{}", self.0)
    }
}

/// Eindeutige Rollen-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl RoleId {
    /// Gibt die rohe Snowflake-ID zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "role:{}", self.0)
    }
}
