//! Kategorie-Konfiguration
//!
//! Wird einmal beim Start aus dem `[categories.<key>]`-Abschnitt der
//! Konfigurationsdatei geladen und danach nicht mehr veraendert. Die
//! Feldnamen folgen dem bestehenden Dateiformat (camelCase).

use autokanal_core::{ChannelId, MemberId, RoleId};
use autokanal_platform::{Overwrite, OverwriteTarget, Permission};
use serde::{Deserialize, Deserializer};

use crate::error::{ReconcileError, ReconcileResult};

/// Kleinste von der Plattform akzeptierte Voice-Bitrate (bit/s)
pub const MIN_BITRATE: u32 = 8_000;
/// Groesste von der Plattform akzeptierte Voice-Bitrate (bit/s)
pub const MAX_BITRATE: u32 = 384_000;
/// Groesstes Teilnehmerlimit eines Voice-Kanals (0 = unbegrenzt)
pub const MAX_SLOTS: u32 = 99;

// ---------------------------------------------------------------------------
// Aufzaehlungen
// ---------------------------------------------------------------------------

/// Position neuer Begleit-Textkanaele
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    /// Plattform-Standard (ans Ende der Kategorie)
    #[default]
    Default,
    /// Ganz oben in der Kategorie
    Top,
}

/// Vordefinierte Berechtigungs-Modi fuer Auto-Voice-Kanaele
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Keine Overwrites, die Plattform vererbt von der Kategorie
    None,
    /// Jeder-Rolle verweigern, danach mit der Kategorie synchronisieren
    Sync,
}

/// Art des Subjekts eines konfigurierten Overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    #[default]
    Role,
    Member,
}

/// Ein explizit konfiguriertes Overwrite
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverwriteConfig {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(rename = "type", default)]
    pub typ: SubjectKind,
    #[serde(default)]
    pub allow: Vec<Permission>,
    #[serde(default)]
    pub deny: Vec<Permission>,
}

impl OverwriteConfig {
    /// Wandelt den Konfigurationseintrag in ein Plattform-Overwrite
    pub fn als_overwrite(&self) -> Overwrite {
        let ziel = match self.typ {
            SubjectKind::Role => OverwriteTarget::Rolle(RoleId(self.id)),
            SubjectKind::Member => OverwriteTarget::Mitglied(MemberId(self.id)),
        };
        Overwrite {
            ziel,
            allow: self.allow.iter().copied().collect(),
            deny: self.deny.iter().copied().collect(),
        }
    }
}

/// Berechtigungen fuer neu angelegte Auto-Voice-Kanaele
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AutoVoicePermissions {
    Modus(PermissionMode),
    Liste(Vec<OverwriteConfig>),
}

impl Default for AutoVoicePermissions {
    fn default() -> Self {
        Self::Modus(PermissionMode::None)
    }
}

// ---------------------------------------------------------------------------
// CategoryConfig
// ---------------------------------------------------------------------------

/// Einstellungen einer verwalteten Kategorie
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryConfig {
    #[serde(deserialize_with = "kanal_snowflake")]
    pub category_id: ChannelId,
    /// Begleit-Textkanaele pro belegtem Voice-Kanal
    pub auto_text: bool,
    /// Dynamischer Pool nummerierter Voice-Kanaele
    pub auto_voice: bool,
    pub auto_text_prefix: String,
    pub auto_text_position: TextPosition,
    pub auto_voice_prefix: String,
    /// Maximale Anzahl Auto-Voice-Kanaele
    pub auto_voice_channel_limit: u32,
    /// Teilnehmerlimit pro Voice-Kanal (0 = unbegrenzt)
    pub auto_voice_slots: u32,
    /// Bitrate in bit/s
    pub auto_voice_bitrate: u32,
    pub auto_voice_permissions: AutoVoicePermissions,
    /// Pool-Wachstum und -Schrumpfung unter einer Kategorie-Sperre serialisieren
    pub serialize_pool: bool,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            category_id: ChannelId(0),
            auto_text: false,
            auto_voice: false,
            auto_text_prefix: "text".into(),
            auto_text_position: TextPosition::Default,
            auto_voice_prefix: "Voice".into(),
            auto_voice_channel_limit: 10,
            auto_voice_slots: 0,
            auto_voice_bitrate: 64_000,
            auto_voice_permissions: AutoVoicePermissions::default(),
            serialize_pool: true,
        }
    }
}

impl CategoryConfig {
    /// Prueft die Konfiguration einmalig vor dem Start
    pub fn validieren(&self) -> ReconcileResult<()> {
        if self.category_id.inner() == 0 {
            return Err(ReconcileError::konfiguration("categoryId fehlt oder ist 0"));
        }
        praefix_pruefen("autoTextPrefix", &self.auto_text_prefix)?;
        praefix_pruefen("autoVoicePrefix", &self.auto_voice_prefix)?;

        if self.auto_voice_channel_limit == 0 {
            return Err(ReconcileError::konfiguration(
                "autoVoiceChannelLimit muss mindestens 1 sein",
            ));
        }
        if self.auto_voice_slots > MAX_SLOTS {
            return Err(ReconcileError::konfiguration(format!(
                "autoVoiceSlots = {} (Maximum: {MAX_SLOTS})",
                self.auto_voice_slots
            )));
        }
        if !(MIN_BITRATE..=MAX_BITRATE).contains(&self.auto_voice_bitrate) {
            return Err(ReconcileError::konfiguration(format!(
                "autoVoiceBitrate = {} (erlaubt: {MIN_BITRATE}..={MAX_BITRATE})",
                self.auto_voice_bitrate
            )));
        }
        if let AutoVoicePermissions::Liste(liste) = &self.auto_voice_permissions {
            if let Some(eintrag) = liste.iter().find(|o| o.id == 0) {
                return Err(ReconcileError::konfiguration(format!(
                    "autoVoicePermissions enthaelt ungueltige id 0 ({:?})",
                    eintrag.typ
                )));
            }
        }
        Ok(())
    }

    /// Name des Auto-Voice-Kanals an einer Slot-Position (1-basiert)
    ///
    /// Slot 1 traegt den blanken Praefix, jeder weitere `"<Praefix> <n>"`.
    pub fn voice_kanal_name(&self, slot: usize) -> String {
        if slot <= 1 {
            self.auto_voice_prefix.clone()
        } else {
            format!("{} {}", self.auto_voice_prefix, slot)
        }
    }

    /// Name des Begleit-Textkanals fuer einen Voice-Kanal
    pub fn text_kanal_name(&self, voice_name: &str) -> String {
        format!(
            "{}-{}",
            self.auto_text_prefix,
            voice_name.to_lowercase().replace(' ', "-")
        )
    }
}

fn praefix_pruefen(feld: &str, wert: &str) -> ReconcileResult<()> {
    if wert.is_empty() {
        return Err(ReconcileError::konfiguration(format!("{feld} darf nicht leer sein")));
    }
    if wert.trim() != wert {
        return Err(ReconcileError::konfiguration(format!(
            "{feld} darf nicht mit Leerzeichen beginnen oder enden"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Snowflake-Deserialisierung
// ---------------------------------------------------------------------------

/// Snowflakes stehen in bestehenden Dateien als String, in neuen als Zahl
#[derive(Deserialize)]
#[serde(untagged)]
enum SnowflakeRoh {
    Zahl(u64),
    Text(String),
}

fn snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match SnowflakeRoh::deserialize(deserializer)? {
        SnowflakeRoh::Zahl(id) => Ok(id),
        SnowflakeRoh::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("ungueltige ID: '{text}'"))),
    }
}

fn kanal_snowflake<'de, D>(deserializer: D) -> Result<ChannelId, D::Error>
where
    D: Deserializer<'de>,
{
    snowflake(deserializer).map(ChannelId)
}
