//! Kanal- und Mitgliedsmodell der Chat-Plattform
//!
//! Alle Objekte gehoeren der Plattform. Der Abgleich liest sie nur und
//! fordert Aenderungen ueber den Adapter an; eine lokale Kopie ist nie
//! autoritativ.

use autokanal_core::{ChannelId, MemberId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Berechtigungen
// ---------------------------------------------------------------------------

/// Einzelne Kanal-Berechtigung (Namen wie in der Plattform-API)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ViewChannel,
    Connect,
    Speak,
    SendMessages,
}

/// Subjekt einer Berechtigungs-Ausnahme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverwriteTarget {
    Rolle(RoleId),
    Mitglied(MemberId),
}

impl std::fmt::Display for OverwriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rolle(id) => id.fmt(f),
            Self::Mitglied(id) => id.fmt(f),
        }
    }
}

/// Berechtigungs-Ausnahme fuer ein Subjekt auf einem Kanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overwrite {
    pub ziel: OverwriteTarget,
    pub allow: BTreeSet<Permission>,
    pub deny: BTreeSet<Permission>,
}

impl Overwrite {
    /// Ausnahme, die die angegebenen Berechtigungen erlaubt
    pub fn erlauben(ziel: OverwriteTarget, berechtigungen: &[Permission]) -> Self {
        Self {
            ziel,
            allow: berechtigungen.iter().copied().collect(),
            deny: BTreeSet::new(),
        }
    }

    /// Ausnahme, die die angegebenen Berechtigungen verweigert
    pub fn verweigern(ziel: OverwriteTarget, berechtigungen: &[Permission]) -> Self {
        Self {
            ziel,
            allow: BTreeSet::new(),
            deny: berechtigungen.iter().copied().collect(),
        }
    }

    /// Explizit gesetzter Sicht-Status (None = nicht gesetzt)
    pub fn sicht(&self) -> Option<bool> {
        if self.allow.contains(&Permission::ViewChannel) {
            Some(true)
        } else if self.deny.contains(&Permission::ViewChannel) {
            Some(false)
        } else {
            None
        }
    }

    /// Setzt das Sicht-Bit und entfernt es aus der Gegenseite
    pub fn sicht_setzen(&mut self, sicht: bool) {
        if sicht {
            self.deny.remove(&Permission::ViewChannel);
            self.allow.insert(Permission::ViewChannel);
        } else {
            self.allow.remove(&Permission::ViewChannel);
            self.deny.insert(Permission::ViewChannel);
        }
    }
}

// ---------------------------------------------------------------------------
// Kanaele
// ---------------------------------------------------------------------------

/// Kanal-Typ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Kategorie,
    Text,
    Voice,
}

impl ChannelKind {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Kategorie => "category",
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// Ein Kanal, wie ihn die Plattform im Moment der Abfrage sieht
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub typ: ChannelKind,
    /// Uebergeordnete Kategorie (None fuer Kategorien selbst)
    pub kategorie_id: Option<ChannelId>,
    pub position: u32,
    /// Maximale Teilnehmerzahl (nur Voice, 0 = unbegrenzt)
    pub user_limit: Option<u32>,
    /// Bitrate in bit/s (nur Voice)
    pub bitrate: Option<u32>,
    /// Aktuelle Belegung (nur Voice)
    pub mitglieder: BTreeSet<MemberId>,
    pub overwrites: Vec<Overwrite>,
}

impl Channel {
    /// True wenn sich niemand im Kanal befindet
    pub fn ist_leer(&self) -> bool {
        self.mitglieder.is_empty()
    }

    /// True wenn der Kanal direkt unter der Kategorie liegt
    pub fn gehoert_zu(&self, kategorie: ChannelId) -> bool {
        self.kategorie_id == Some(kategorie)
    }

    /// Explizites Sicht-Overwrite eines Mitglieds auf diesem Kanal
    pub fn sicht_fuer(&self, mitglied: MemberId) -> Option<bool> {
        self.overwrites
            .iter()
            .find(|o| o.ziel == OverwriteTarget::Mitglied(mitglied))
            .and_then(Overwrite::sicht)
    }
}

/// Eigenschaften fuer das Anlegen eines Kanals
#[derive(Debug, Clone)]
pub struct ChannelProps {
    pub name: String,
    pub typ: ChannelKind,
    pub user_limit: Option<u32>,
    pub bitrate: Option<u32>,
    /// None = Berechtigungen der Kategorie uebernehmen
    pub overwrites: Option<Vec<Overwrite>>,
    pub position: Option<u32>,
}

impl ChannelProps {
    /// Minimale Eigenschaften: nur Name und Typ
    pub fn neu(name: impl Into<String>, typ: ChannelKind) -> Self {
        Self {
            name: name.into(),
            typ,
            user_limit: None,
            bitrate: None,
            overwrites: None,
            position: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mitglieder
// ---------------------------------------------------------------------------

/// Ein Mitglied der Gilde
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    /// Administratoren sehen jeden Kanal implizit
    pub ist_administrator: bool,
}
