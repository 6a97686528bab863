//! autokanal-platform – Schnittstelle zur Chat-Plattform
//!
//! Dieses Crate definiert:
//! - `ChatPlatform`: den Adapter-Trait, ueber den der Abgleich Kanaele
//!   auflistet, anlegt, loescht und Berechtigungen setzt
//! - Das Kanal-/Mitglieds-Modell, wie es die Plattform liefert
//! - `InMemoryPlatform`: eine vollstaendige In-Process-Implementierung fuer
//!   Tests und den Trockenlauf des Bots
//!
//! Transport, Login und Gateway-Sitzung gehoeren nicht hierher; ein echter
//! Adapter implementiert nur den Trait.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod model;

// Bequeme Re-Exporte
pub use adapter::ChatPlatform;
pub use error::{PlatformError, PlatformResult};
pub use memory::{Aufruf, FehlerRegel, InMemoryPlatform};
pub use model::{Channel, ChannelKind, ChannelProps, Member, Overwrite, OverwriteTarget, Permission};
