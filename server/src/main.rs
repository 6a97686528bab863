//! Autokanal – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Bot.
//! Der Gateway-Adapter zur echten Chat-Plattform ist nicht Teil dieses
//! Repositories; ohne ihn laeuft der Bot gegen die In-Memory-Plattform
//! (Trockenlauf), mit je einer leeren Kategorie pro Konfigurationseintrag.

use anyhow::Result;
use autokanal_bot::{Bot, config::BotConfig};
use autokanal_platform::InMemoryPlatform;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("AUTOKANAL_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config = BotConfig::laden(&config_pfad)?;

    autokanal_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        kategorien = config.categories.len(),
        "Autokanal wird initialisiert"
    );
    tracing::warn!("Kein Gateway-Adapter eingebunden, Trockenlauf gegen die In-Memory-Plattform");

    // Konfigurierte Kategorien im Speicher nachbilden
    let plattform = Arc::new(InMemoryPlatform::neu());
    for (handler, kategorie) in config.categories.iter_mut() {
        kategorie.category_id = plattform.kategorie_anlegen(handler);
    }

    Bot::neu(config).starten(plattform).await
}
