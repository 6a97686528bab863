//! Begleit-Textkanaele – Existenz und Sichtbarkeit pro Voice-Kanal
//!
//! Zu jedem belegten Voice-Kanal der Kategorie gibt es genau einen
//! Textkanal `<textPraefix>-<voice-name>`. Wer im Voice-Kanal ist, sieht den
//! Textkanal; wer ihn verlaesst, verliert die Sicht. Administratoren werden
//! nie angefasst, sie sehen jeden Kanal implizit.
//!
//! Ein Overwrite wird nur geschrieben, wenn sich der Sicht-Status aendert.
//! Fehler zaehlt dieses Modul selbst in `autokanal_reconcile_errors_total`.

use autokanal_core::MemberId;
use autokanal_observability::AutokanalMetrics;
use autokanal_platform::{
    Channel, ChannelKind, ChannelProps, ChatPlatform, Member, Overwrite, OverwriteTarget,
    Permission,
};
use futures_util::future::join_all;
use std::sync::Arc;

use crate::config::{CategoryConfig, TextPosition};
use crate::error::{ReconcileError, ReconcileResult};

/// Verwaltet die Begleit-Textkanaele einer Kategorie
pub struct TextVisibility<P: ChatPlatform> {
    plattform: Arc<P>,
    config: Arc<CategoryConfig>,
    metriken: AutokanalMetrics,
}

impl<P: ChatPlatform> TextVisibility<P> {
    pub fn neu(plattform: Arc<P>, config: Arc<CategoryConfig>, metriken: AutokanalMetrics) -> Self {
        Self {
            plattform,
            config,
            metriken,
        }
    }

    /// Bringt den Begleitkanal eines Voice-Kanals auf den aktuellen Stand
    ///
    /// Mit `mitglied` wird nur dessen Overwrite auf `sicht` gebracht. Ohne
    /// Mitglied werden alle Anwesenden abgeglichen. Jede fehlgeschlagene
    /// Plattform-Operation wird hier protokolliert und gezaehlt; der erste
    /// Fehler wird zurueckgegeben, nachdem alle Geschwister gelaufen sind.
    pub async fn begleiter_aktualisieren(
        &self,
        voice: &Channel,
        mitglied: Option<&Member>,
        sicht: bool,
    ) -> ReconcileResult<()> {
        if !self.config.auto_text
            || voice.typ != ChannelKind::Voice
            || !voice.gehoert_zu(self.config.category_id)
        {
            return Ok(());
        }

        let Some(text) = self.existenz_abgleichen(voice).await? else {
            return Ok(());
        };

        match mitglied {
            Some(m) => self.sicht_abgleichen(m, &text, sicht).await.map(|_| ()),
            None => self.alle_mitglieder_synchronisieren(voice, &text).await,
        }
    }

    /// Legt den Begleitkanal an oder loescht ihn, je nach Belegung
    ///
    /// Liefert den Begleitkanal, falls danach einer existiert. Doppelte
    /// Begleitkanaele aus frueheren Wettlaeufen werden entfernt.
    pub async fn existenz_abgleichen(&self, voice: &Channel) -> ReconcileResult<Option<Channel>> {
        let name = self.config.text_kanal_name(&voice.name);
        let vorhanden = self
            .plattform
            .kanaele_auflisten(self.config.category_id, ChannelKind::Text, Some(&name))
            .await
            .map_err(|e| self.fehler_zaehlen(e.into()))?;

        if voice.ist_leer() {
            self.alle_loeschen(&vorhanden).await?;
            return Ok(None);
        }

        let Some((erster, doppelt)) = vorhanden.split_first() else {
            return self.text_kanal_erstellen(name).await.map(Some);
        };
        self.alle_loeschen(doppelt).await?;
        Ok(Some(erster.clone()))
    }

    async fn text_kanal_erstellen(&self, name: String) -> ReconcileResult<Channel> {
        let mut eigenschaften = ChannelProps::neu(name.clone(), ChannelKind::Text);
        eigenschaften.overwrites = Some(vec![
            Overwrite::verweigern(
                OverwriteTarget::Rolle(self.plattform.jeder_rolle()),
                &[Permission::ViewChannel],
            ),
            Overwrite::erlauben(
                OverwriteTarget::Mitglied(self.plattform.bot_id()),
                &[Permission::ViewChannel],
            ),
        ]);
        if self.config.auto_text_position == TextPosition::Top {
            eigenschaften.position = Some(0);
        }

        match self
            .plattform
            .kanal_erstellen(self.config.category_id, eigenschaften)
            .await
        {
            Ok(kanal) => {
                self.metriken
                    .channels_created_total
                    .with_label_values(&[ChannelKind::Text.als_str()])
                    .inc();
                tracing::info!(kanal = %kanal.name, kanal_id = %kanal.id, "Textkanal erstellt");
                Ok(kanal)
            }
            Err(e) => {
                tracing::error!(kanal = %name, fehler = %e, "Textkanal konnte nicht erstellt werden");
                Err(self.fehler_zaehlen(e.into()))
            }
        }
    }

    /// Loescht alle Kanaele parallel; liefert den ersten Fehler
    async fn alle_loeschen(&self, kanaele: &[Channel]) -> ReconcileResult<()> {
        if kanaele.is_empty() {
            return Ok(());
        }
        let ergebnisse = join_all(kanaele.iter().map(|k| self.text_kanal_loeschen(k))).await;
        erster_fehler(ergebnisse)
    }

    async fn text_kanal_loeschen(&self, kanal: &Channel) -> ReconcileResult<()> {
        match self.plattform.kanal_loeschen(kanal.id).await {
            Ok(()) => {
                self.metriken
                    .channels_deleted_total
                    .with_label_values(&[ChannelKind::Text.als_str()])
                    .inc();
                tracing::info!(kanal = %kanal.name, kanal_id = %kanal.id, "Textkanal geloescht");
                Ok(())
            }
            Err(e) if e.ist_nicht_gefunden() => {
                tracing::debug!(kanal = %kanal.name, kanal_id = %kanal.id, "Textkanal bereits entfernt");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    kanal = %kanal.name,
                    kanal_id = %kanal.id,
                    fehler = %e,
                    "Textkanal konnte nicht geloescht werden"
                );
                Err(self.fehler_zaehlen(e.into()))
            }
        }
    }

    /// Bringt das Overwrite eines Mitglieds auf `sicht`
    ///
    /// Liefert true, wenn ein Overwrite geschrieben wurde.
    pub async fn sicht_abgleichen(
        &self,
        mitglied: &Member,
        text: &Channel,
        sicht: bool,
    ) -> ReconcileResult<bool> {
        if mitglied.ist_administrator {
            tracing::trace!(mitglied_id = %mitglied.id, "Administrator, Overwrite bleibt unveraendert");
            return Ok(false);
        }

        let aktuell = text.sicht_fuer(mitglied.id).unwrap_or(false);
        if aktuell == sicht {
            return Ok(false);
        }

        if let Err(e) = self
            .plattform
            .berechtigung_setzen(text.id, OverwriteTarget::Mitglied(mitglied.id), sicht)
            .await
        {
            tracing::warn!(
                kanal = %text.name,
                mitglied_id = %mitglied.id,
                fehler = %e,
                "Sicht-Overwrite konnte nicht gesetzt werden"
            );
            return Err(self.fehler_zaehlen(e.into()));
        }
        self.metriken.overwrite_edits_total.inc();
        tracing::debug!(
            kanal = %text.name,
            mitglied_id = %mitglied.id,
            sicht,
            "Sicht-Overwrite gesetzt"
        );
        Ok(true)
    }

    /// Gleicht die Overwrites aller Mitglieder mit der Belegung ab
    ///
    /// Anwesende erhalten Sicht, verbliebene Sicht-Overwrites Abwesender
    /// werden entzogen. Jedes Mitglied wird unabhaengig bearbeitet; der
    /// erste Fehler wird erst nach allen Mitgliedern zurueckgegeben.
    pub async fn alle_mitglieder_synchronisieren(
        &self,
        voice: &Channel,
        text: &Channel,
    ) -> ReconcileResult<()> {
        let bot_id = self.plattform.bot_id();
        let abwesend = text.overwrites.iter().filter_map(|o| match o.ziel {
            OverwriteTarget::Mitglied(id)
                if id != bot_id && o.sicht() == Some(true) && !voice.mitglieder.contains(&id) =>
            {
                Some((id, false))
            }
            _ => None,
        });
        let auftraege: Vec<(MemberId, bool)> = voice
            .mitglieder
            .iter()
            .map(|id| (*id, true))
            .chain(abwesend)
            .collect();

        let ergebnisse = join_all(
            auftraege
                .iter()
                .map(|(id, sicht)| self.mitglied_abgleichen(*id, text, *sicht)),
        )
        .await;
        erster_fehler(ergebnisse.into_iter().map(|e| e.map(|_| ())))
    }

    async fn mitglied_abgleichen(&self, id: MemberId, text: &Channel, sicht: bool) -> ReconcileResult<bool> {
        let mitglied = match self.plattform.mitglied_laden(id).await {
            Ok(m) => m,
            // Nicht mehr in der Gilde: die Plattform entfernt das Overwrite selbst
            Err(e) if e.ist_nicht_gefunden() && !sicht => return Ok(false),
            Err(e) => {
                tracing::warn!(
                    kanal = %text.name,
                    mitglied_id = %id,
                    fehler = %e,
                    "Mitglied konnte nicht geladen werden"
                );
                return Err(self.fehler_zaehlen(e.into()));
            }
        };
        self.sicht_abgleichen(&mitglied, text, sicht).await
    }

    fn fehler_zaehlen(&self, e: ReconcileError) -> ReconcileError {
        self.metriken
            .reconcile_errors_total
            .with_label_values(&[e.art()])
            .inc();
        e
    }
}

fn erster_fehler(ergebnisse: impl IntoIterator<Item = ReconcileResult<()>>) -> ReconcileResult<()> {
    ergebnisse.into_iter().find_map(Result::err).map_or(Ok(()), Err)
}
