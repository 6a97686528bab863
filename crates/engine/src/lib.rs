//! autokanal-engine – Abgleich von Auto-Voice-Pool und Begleit-Textkanaelen
//!
//! Pro Kategorie laeuft ein [`Coordinator`]. Er reagiert auf
//! Mitgliedschafts-Ereignisse der Plattform, serialisiert sie pro Kanal ueber
//! die [`KeyedMutexRegistry`] und gleicht danach Begleitkanaele
//! ([`TextVisibility`]) und den Voice-Pool ([`VoicePool`]) ab.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod text_visibility;
pub mod voice_pool;

pub use config::{
    AutoVoicePermissions, CategoryConfig, OverwriteConfig, PermissionMode, SubjectKind,
    TextPosition,
};
pub use coordinator::{Coordinator, CoordinatorOptionen, CycleOutcome};
pub use error::{ReconcileError, ReconcileResult};
pub use locks::{KanalSperre, KeyedMutexRegistry};
pub use text_visibility::TextVisibility;
pub use voice_pool::{PoolBericht, VoicePool};

#[cfg(test)]
mod tests;
