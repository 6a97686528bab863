//! Voice-Pool – nummerierte Auto-Voice-Kanaele einer Kategorie
//!
//! Der Pool bildet eine lueckenlose Folge `Praefix`, `Praefix 2`, ...,
//! `Praefix k`. Solange `k` unter dem Limit liegt, bleibt am Ende genau ein
//! leerer Kanal als Reserve: wird der letzte belegt, entsteht ein neuer,
//! stehen mehrere leere am Ende, werden die ueberzaehligen geloescht.
//!
//! Der Zustand wird bei jedem Abgleich neu von der Plattform gelesen.

use autokanal_observability::AutokanalMetrics;
use autokanal_platform::{
    Channel, ChannelKind, ChannelProps, ChatPlatform, Overwrite, OverwriteTarget, Permission,
};
use futures_util::future::join_all;
use std::sync::Arc;

use crate::config::{AutoVoicePermissions, CategoryConfig, PermissionMode};
use crate::error::{ReconcileError, ReconcileResult};
use crate::locks::KeyedMutexRegistry;

/// Ergebnis eines Pool-Abgleichs
#[derive(Debug, Default)]
pub struct PoolBericht {
    /// Alle Kanaele wurden beim Start zurueckgesetzt
    pub zurueckgesetzt: bool,
    /// Name des neu angelegten Kanals
    pub erstellt: Option<String>,
    /// Namen der geloeschten Kanaele
    pub geloescht: Vec<String>,
    /// Fehlgeschlagene Einzeloperationen (nicht zurueckgerollt)
    pub fehler: Vec<ReconcileError>,
}

impl PoolBericht {
    /// True wenn der Abgleich nichts veraendert hat
    pub fn ist_unveraendert(&self) -> bool {
        !self.zurueckgesetzt && self.erstellt.is_none() && self.geloescht.is_empty()
    }
}

/// Verwaltet den Auto-Voice-Pool einer Kategorie
pub struct VoicePool<P: ChatPlatform> {
    plattform: Arc<P>,
    config: Arc<CategoryConfig>,
    sperren: KeyedMutexRegistry,
    metriken: AutokanalMetrics,
}

impl<P: ChatPlatform> VoicePool<P> {
    pub fn neu(
        plattform: Arc<P>,
        config: Arc<CategoryConfig>,
        sperren: KeyedMutexRegistry,
        metriken: AutokanalMetrics,
    ) -> Self {
        Self {
            plattform,
            config,
            sperren,
            metriken,
        }
    }

    /// Gleicht den Pool mit der aktuellen Belegung ab
    ///
    /// Mit `ist_initial` werden bei vollstaendig leerem Pool alle Kanaele
    /// geloescht, bevor der Pool neu aufgebaut wird.
    pub async fn abgleichen(&self, ist_initial: bool) -> ReconcileResult<PoolBericht> {
        let mut bericht = PoolBericht::default();
        if !self.config.auto_voice {
            return Ok(bericht);
        }

        // Reihenfolge immer Kanal-Sperre vor Kategorie-Sperre
        let _pool_sperre = if self.config.serialize_pool {
            Some(self.sperren.sperren(self.config.category_id).await?)
        } else {
            None
        };

        let mut folge = self.folge_laden().await?;

        if ist_initial && !folge.is_empty() && folge.iter().all(Channel::ist_leer) {
            let ergebnisse = join_all(folge.iter().map(|k| self.voice_kanal_loeschen(k))).await;
            let mut fehlgeschlagen = false;
            for ergebnis in ergebnisse {
                if let Err(e) = ergebnis {
                    fehlgeschlagen = true;
                    bericht.fehler.push(e);
                }
            }
            if fehlgeschlagen {
                // Folge hat jetzt Luecken, der naechste Abgleich leitet sie neu ab
                return Ok(bericht);
            }
            bericht.geloescht = folge.drain(..).map(|k| k.name).collect();
            bericht.zurueckgesetzt = true;
            tracing::info!(kategorie = %self.config.category_id, "Voice-Kanaele zurueckgesetzt");
        }

        let mut leer_am_ende = folge.iter().rev().take_while(|k| k.ist_leer()).count();

        if leer_am_ende == 0 && folge.len() < self.config.auto_voice_channel_limit as usize {
            match self.voice_kanal_erstellen(folge.len() + 1).await {
                Ok(kanal) => bericht.erstellt = Some(kanal.name),
                Err(e) => bericht.fehler.push(e),
            }
            return Ok(bericht);
        }

        let mut ueberzaehlig = Vec::new();
        while leer_am_ende > 1 {
            if let Some(kanal) = folge.pop() {
                ueberzaehlig.push(kanal);
            }
            leer_am_ende -= 1;
        }

        let ergebnisse = join_all(ueberzaehlig.iter().map(|k| self.voice_kanal_loeschen(k))).await;
        for (kanal, ergebnis) in ueberzaehlig.into_iter().zip(ergebnisse) {
            match ergebnis {
                Ok(()) => bericht.geloescht.push(kanal.name),
                Err(e) => bericht.fehler.push(e),
            }
        }

        Ok(bericht)
    }

    /// Liest die lueckenlose Folge ab Slot 1, Abbruch an der ersten Luecke
    pub async fn folge_laden(&self) -> ReconcileResult<Vec<Channel>> {
        let mut alle = self
            .plattform
            .kanaele_auflisten(self.config.category_id, ChannelKind::Voice, None)
            .await?;

        let mut folge = Vec::new();
        loop {
            let name = self.config.voice_kanal_name(folge.len() + 1);
            match alle.iter().position(|k| k.name == name) {
                Some(index) => folge.push(alle.swap_remove(index)),
                None => break,
            }
        }
        Ok(folge)
    }

    /// Legt den Auto-Voice-Kanal fuer einen Slot an
    pub async fn voice_kanal_erstellen(&self, slot: usize) -> ReconcileResult<Channel> {
        let name = self.config.voice_kanal_name(slot);
        let (overwrites, synchronisieren) = voice_overwrites(
            &self.config.auto_voice_permissions,
            self.plattform.jeder_rolle(),
            self.plattform.bot_id(),
        );

        let mut eigenschaften = ChannelProps::neu(name.clone(), ChannelKind::Voice);
        eigenschaften.user_limit = Some(self.config.auto_voice_slots);
        eigenschaften.bitrate = Some(self.config.auto_voice_bitrate);
        eigenschaften.overwrites = overwrites;

        let kanal = match self
            .plattform
            .kanal_erstellen(self.config.category_id, eigenschaften)
            .await
        {
            Ok(kanal) => kanal,
            Err(e) => {
                tracing::error!(kanal = %name, fehler = %e, "Voice-Kanal konnte nicht erstellt werden");
                return Err(e.into());
            }
        };
        self.metriken
            .channels_created_total
            .with_label_values(&[ChannelKind::Voice.als_str()])
            .inc();

        if synchronisieren {
            if let Err(e) = self.plattform.mit_kategorie_synchronisieren(kanal.id).await {
                tracing::error!(
                    kanal = %kanal.name,
                    kanal_id = %kanal.id,
                    fehler = %e,
                    "Berechtigungen konnten nicht mit der Kategorie synchronisiert werden"
                );
                return Err(e.into());
            }
        }

        tracing::info!(kanal = %kanal.name, kanal_id = %kanal.id, "Voice-Kanal erstellt");
        Ok(kanal)
    }

    async fn voice_kanal_loeschen(&self, kanal: &Channel) -> ReconcileResult<()> {
        match self.plattform.kanal_loeschen(kanal.id).await {
            Ok(()) => {
                self.metriken
                    .channels_deleted_total
                    .with_label_values(&[ChannelKind::Voice.als_str()])
                    .inc();
                tracing::info!(kanal = %kanal.name, kanal_id = %kanal.id, "Voice-Kanal geloescht");
            }
            Err(e) if e.ist_nicht_gefunden() => {
                tracing::debug!(kanal = %kanal.name, kanal_id = %kanal.id, "Voice-Kanal bereits entfernt");
            }
            Err(e) => {
                tracing::error!(
                    kanal = %kanal.name,
                    kanal_id = %kanal.id,
                    fehler = %e,
                    "Voice-Kanal konnte nicht geloescht werden"
                );
                return Err(e.into());
            }
        }
        self.sperren.entfernen_wenn_frei(kanal.id);
        Ok(())
    }
}

/// Leitet die Overwrites eines neuen Auto-Voice-Kanals ab
///
/// Liefert die Overwrites (None = von der Kategorie erben) und ob nach dem
/// Anlegen mit der Kategorie synchronisiert werden muss. Wo Overwrites
/// gesetzt werden, erhaelt der Bot selbst Sicht und Verbindung.
pub fn voice_overwrites(
    berechtigungen: &AutoVoicePermissions,
    jeder_rolle: autokanal_core::RoleId,
    bot_id: autokanal_core::MemberId,
) -> (Option<Vec<Overwrite>>, bool) {
    let (basis, synchronisieren) = match berechtigungen {
        AutoVoicePermissions::Modus(PermissionMode::None) => (None, false),
        AutoVoicePermissions::Modus(PermissionMode::Sync) => (
            Some(vec![Overwrite::verweigern(
                OverwriteTarget::Rolle(jeder_rolle),
                &[Permission::ViewChannel],
            )]),
            true,
        ),
        AutoVoicePermissions::Liste(liste) if liste.is_empty() => (None, false),
        AutoVoicePermissions::Liste(liste) => {
            (Some(liste.iter().map(|o| o.als_overwrite()).collect()), false)
        }
    };

    let overwrites = basis.map(|mut o: Vec<Overwrite>| {
        o.push(Overwrite::erlauben(
            OverwriteTarget::Mitglied(bot_id),
            &[Permission::ViewChannel, Permission::Connect],
        ));
        o
    });
    (overwrites, synchronisieren)
}
