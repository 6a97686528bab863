//! Mitgliedschafts-Ereignisse
//!
//! Die Plattform meldet jede Aenderung des Voice-Zustands eines Mitglieds.
//! Betreten, Verlassen und Wechseln werden einheitlich als
//! `MembershipChange { alt, neu }` dargestellt.

use crate::types::{ChannelId, MemberId};
use serde::{Deserialize, Serialize};

/// Ein Mitglied hat seinen Voice-Kanal gewechselt (oder betreten/verlassen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// Vorheriger Voice-Kanal (None = war in keinem Kanal)
    pub alt: Option<ChannelId>,
    /// Neuer Voice-Kanal (None = hat die Sprachverbindung getrennt)
    pub neu: Option<ChannelId>,
    /// Betroffenes Mitglied
    pub mitglied: MemberId,
}

impl MembershipChange {
    /// Betreten eines Kanals ohne vorherigen Kanal
    pub fn betreten(mitglied: MemberId, kanal: ChannelId) -> Self {
        Self {
            alt: None,
            neu: Some(kanal),
            mitglied,
        }
    }

    /// Verlassen eines Kanals ohne neuen Kanal
    pub fn verlassen(mitglied: MemberId, kanal: ChannelId) -> Self {
        Self {
            alt: Some(kanal),
            neu: None,
            mitglied,
        }
    }

    /// Wechsel von einem Kanal in einen anderen
    pub fn wechseln(mitglied: MemberId, von: ChannelId, zu: ChannelId) -> Self {
        Self {
            alt: Some(von),
            neu: Some(zu),
            mitglied,
        }
    }

    /// True wenn sich der Kanal nicht geaendert hat (Mute/Unmute etc.)
    pub fn ist_statuswechsel(&self) -> bool {
        self.alt == self.neu
    }

    /// Schluessel fuer die Kanal-Sperre: der betretene Kanal, sonst der verlassene
    pub fn sperr_schluessel(&self) -> Option<ChannelId> {
        self.neu.or(self.alt)
    }
}
