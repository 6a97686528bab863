//! autokanal-bot – Bibliotheks-Root
//!
//! Verbindet Konfiguration, Plattform-Adapter, Koordinatoren und den
//! Observability-Server zu einem lauffaehigen Bot.

pub mod config;

use anyhow::Result;
use autokanal_core::AutokanalError;
use autokanal_engine::Coordinator;
use autokanal_observability::{AutokanalMetrics, HealthState, observability_server_starten};
use autokanal_platform::ChatPlatform;
use config::BotConfig;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Haelt den Bot-Zustand zusammen
pub struct Bot {
    pub config: BotConfig,
}

impl Bot {
    /// Erstellt einen neuen Bot aus der gegebenen Konfiguration
    pub fn neu(config: BotConfig) -> Self {
        Self { config }
    }

    /// Startet alle Kategorien und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Koordinatoren erstellen und jede Kategorie pruefen; fatale Fehler
    ///    brechen ab, alle anderen werden protokolliert
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. Pro Kategorie die Ereignisschleife starten
    /// 4. Auf Ctrl-C warten oder bis alle Ereignisquellen geschlossen sind
    pub async fn starten<P: ChatPlatform>(self, plattform: Arc<P>) -> Result<()> {
        let metriken = AutokanalMetrics::neu()?;
        let optionen = self.config.koordinator_optionen();

        let mut koordinatoren = Vec::with_capacity(self.config.categories.len());
        for (handler, kategorie) in &self.config.categories {
            let koordinator = Coordinator::neu(
                handler.clone(),
                plattform.clone(),
                kategorie.clone(),
                optionen.clone(),
                metriken.clone(),
            )
            .map_err(AutokanalError::from)?;
            if let Err(e) = koordinator.kategorie_pruefen().await {
                let e = AutokanalError::from(e);
                if e.ist_fatal() {
                    return Err(anyhow::Error::new(e).context(format!("Kategorie '{handler}'")));
                }
                tracing::warn!(
                    handler = %handler,
                    fehler = %e,
                    "Kategorie konnte nicht geprueft werden, Start wird fortgesetzt"
                );
            }
            koordinatoren.push(Arc::new(koordinator));
        }

        if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            let health = HealthState::neu(metriken.clone(), koordinatoren.len());
            let metriken = metriken.clone();
            tokio::spawn(async move {
                if let Err(e) = observability_server_starten(adresse, metriken, health).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        tracing::info!(kategorien = koordinatoren.len(), "Bot startet");

        let mut laufend = JoinSet::new();
        for koordinator in koordinatoren {
            laufend.spawn(koordinator.ausfuehren());
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Bot wird beendet");
            }
            _ = alle_abwarten(&mut laufend) => {
                tracing::info!("Alle Ereignisquellen geschlossen, Bot wird beendet");
            }
        }

        laufend.shutdown().await;
        Ok(())
    }
}

async fn alle_abwarten(laufend: &mut JoinSet<()>) {
    while let Some(ergebnis) = laufend.join_next().await {
        if let Err(e) = ergebnis {
            tracing::error!(fehler = %e, "Kategorie-Task abgebrochen");
        }
    }
}
