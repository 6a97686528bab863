//! Abgleich-Koordinator – ein Zyklus pro Mitgliedschafts-Ereignis
//!
//! Jede Kategorie hat einen Koordinator. Er abonniert die Ereignisse der
//! Plattform, fuehrt beim Start einen vollen Abgleich aus und verarbeitet
//! danach jedes Ereignis als eigenen Task:
//!
//! ```text
//! Idle -> Locked(schluessel) -> Reconciling -> Idle
//!                     \                \
//!                      +-> Failed ------+-> Idle
//! ```
//!
//! Ereignisse mit gleichem Schluessel (`neu` oder ersatzweise `alt`) laufen
//! streng nacheinander, verschiedene Schluessel parallel.

use autokanal_core::{ChannelId, MemberId, MembershipChange};
use autokanal_observability::AutokanalMetrics;
use autokanal_platform::{Channel, ChannelKind, ChatPlatform, Member};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::sync::broadcast::error::RecvError;
use tracing::Instrument;

use crate::config::CategoryConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::locks::{KeyedMutexRegistry, STANDARD_SPERR_ZEITLIMIT};
use crate::text_visibility::TextVisibility;
use crate::voice_pool::{PoolBericht, VoicePool};

/// Standardgrenze gleichzeitig verarbeiteter Ereignisse
pub const STANDARD_MAX_EREIGNISSE: usize = 64;

/// Laufzeit-Optionen eines Koordinators
#[derive(Debug, Clone)]
pub struct CoordinatorOptionen {
    pub sperr_zeitlimit: Duration,
    pub max_gleichzeitige_ereignisse: usize,
}

impl Default for CoordinatorOptionen {
    fn default() -> Self {
        Self {
            sperr_zeitlimit: STANDARD_SPERR_ZEITLIMIT,
            max_gleichzeitige_ereignisse: STANDARD_MAX_EREIGNISSE,
        }
    }
}

/// Ausgang eines Ereignis-Zyklus
#[derive(Debug)]
pub enum CycleOutcome {
    /// Ohne strukturelle Wirkung (Stummschalten, fremde Kategorie)
    Verworfen,
    /// Abgleich ohne Fehler durchgelaufen
    Abgeschlossen,
    /// Mindestens eine Operation ist fehlgeschlagen; enthaelt den ersten Fehler
    Fehlgeschlagen(ReconcileError),
}

impl CycleOutcome {
    /// Label fuer `autokanal_events_total{outcome}`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verworfen => "discarded",
            Self::Abgeschlossen => "completed",
            Self::Fehlgeschlagen(_) => "failed",
        }
    }

    pub fn ist_fehlgeschlagen(&self) -> bool {
        matches!(self, Self::Fehlgeschlagen(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Zustand {
    Idle,
    Locked(ChannelId),
    Reconciling,
    Failed,
}

fn zustand_melden(zustand: Zustand) {
    match zustand {
        Zustand::Locked(schluessel) => tracing::trace!(%schluessel, "Zustandswechsel: Locked"),
        andere => tracing::trace!(zustand = ?andere, "Zustandswechsel"),
    }
}

/// Koordinator einer Kategorie
pub struct Coordinator<P: ChatPlatform> {
    handler: String,
    plattform: Arc<P>,
    config: Arc<CategoryConfig>,
    sperren: KeyedMutexRegistry,
    pool: VoicePool<P>,
    text: TextVisibility<P>,
    metriken: AutokanalMetrics,
    optionen: CoordinatorOptionen,
}

impl<P: ChatPlatform> Coordinator<P> {
    /// Erstellt den Koordinator, nachdem die Konfiguration geprueft wurde
    pub fn neu(
        handler: impl Into<String>,
        plattform: Arc<P>,
        config: CategoryConfig,
        optionen: CoordinatorOptionen,
        metriken: AutokanalMetrics,
    ) -> ReconcileResult<Self> {
        config.validieren()?;
        let config = Arc::new(config);
        let sperren = KeyedMutexRegistry::neu(optionen.sperr_zeitlimit);

        Ok(Self {
            handler: handler.into(),
            pool: VoicePool::neu(
                plattform.clone(),
                config.clone(),
                sperren.clone(),
                metriken.clone(),
            ),
            text: TextVisibility::neu(plattform.clone(), config.clone(), metriken.clone()),
            plattform,
            config,
            sperren,
            metriken,
            optionen,
        })
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn config(&self) -> &CategoryConfig {
        &self.config
    }

    /// Die Sperr-Registry dieses Koordinators
    pub fn sperren(&self) -> &KeyedMutexRegistry {
        &self.sperren
    }

    // -----------------------------------------------------------------------
    // Ereignis-Zyklus
    // -----------------------------------------------------------------------

    /// Verarbeitet ein einzelnes Mitgliedschafts-Ereignis
    pub async fn ereignis_verarbeiten(&self, ereignis: MembershipChange) -> CycleOutcome {
        let span = tracing::debug_span!(
            "ereignis",
            mitglied_id = %ereignis.mitglied,
            schluessel = ?ereignis.sperr_schluessel()
        );
        let outcome = self.zyklus(ereignis).instrument(span).await;
        self.metriken
            .events_total
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn zyklus(&self, ereignis: MembershipChange) -> CycleOutcome {
        zustand_melden(Zustand::Idle);
        if ereignis.ist_statuswechsel() {
            tracing::trace!("Statuswechsel ohne Kanalwechsel verworfen");
            return CycleOutcome::Verworfen;
        }
        let Some(schluessel) = ereignis.sperr_schluessel() else {
            return CycleOutcome::Verworfen;
        };

        let start = Instant::now();
        let outcome = match self.gesperrt_abgleichen(ereignis, schluessel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                zustand_melden(Zustand::Failed);
                self.fehler_zaehlen(&e);
                match &e {
                    ReconcileError::SperreZeitlimit { .. } => {
                        tracing::error!(
                            kategorie_id = %self.config.category_id,
                            kanal_id = %schluessel,
                            fehler = %e,
                            "Ereignis verworfen: Kanal-Sperre nicht erhalten"
                        );
                    }
                    _ => {
                        tracing::warn!(
                            kategorie_id = %self.config.category_id,
                            kanal_id = %schluessel,
                            fehler = %e,
                            "Abgleich fehlgeschlagen"
                        );
                    }
                }
                CycleOutcome::Fehlgeschlagen(e)
            }
        };
        self.metriken
            .reconcile_duration_seconds
            .observe(start.elapsed().as_secs_f64());
        zustand_melden(Zustand::Idle);
        outcome
    }

    async fn gesperrt_abgleichen(
        &self,
        ereignis: MembershipChange,
        schluessel: ChannelId,
    ) -> ReconcileResult<CycleOutcome> {
        let _sperre = self.sperren.sperren(schluessel).await?;
        zustand_melden(Zustand::Locked(schluessel));

        let alt = self.kanal_aufloesen(ereignis.alt).await?;
        let neu = self.kanal_aufloesen(ereignis.neu).await?;
        if !self.ist_relevant(&ereignis, alt.as_ref(), neu.as_ref()) {
            tracing::trace!("Ereignis betrifft die Kategorie nicht");
            return Ok(CycleOutcome::Verworfen);
        }

        zustand_melden(Zustand::Reconciling);
        let mitglied = self.mitglied_aufloesen(ereignis.mitglied).await?;

        let (ergebnis_alt, ergebnis_neu) = tokio::join!(
            self.begleiter_falls_vorhanden(alt.as_ref(), mitglied.as_ref(), false),
            self.begleiter_falls_vorhanden(neu.as_ref(), mitglied.as_ref(), true),
        );

        // Begleitfehler sind bereits pro Operation gezaehlt
        let mut fehler = Vec::new();
        for (kanal, ergebnis) in [(alt.as_ref(), ergebnis_alt), (neu.as_ref(), ergebnis_neu)] {
            if let (Some(kanal), Err(e)) = (kanal, ergebnis) {
                tracing::warn!(
                    kanal = %kanal.name,
                    kanal_id = %kanal.id,
                    mitglied_id = %ereignis.mitglied,
                    fehler = %e,
                    "Begleitkanal konnte nicht abgeglichen werden"
                );
                fehler.push(e);
            }
        }

        let bericht = self.pool.abgleichen(false).await?;
        self.bericht_protokollieren(&bericht);
        fehler.extend(bericht.fehler);

        Ok(match fehler.into_iter().next() {
            Some(e) => {
                zustand_melden(Zustand::Failed);
                CycleOutcome::Fehlgeschlagen(e)
            }
            None => CycleOutcome::Abgeschlossen,
        })
    }

    async fn begleiter_falls_vorhanden(
        &self,
        kanal: Option<&Channel>,
        mitglied: Option<&Member>,
        sicht: bool,
    ) -> ReconcileResult<()> {
        match kanal {
            Some(k) => self.text.begleiter_aktualisieren(k, mitglied, sicht).await,
            None => Ok(()),
        }
    }

    /// Laedt einen Kanal; ein geloeschter Kanal gilt als abwesend
    async fn kanal_aufloesen(&self, id: Option<ChannelId>) -> ReconcileResult<Option<Channel>> {
        let Some(id) = id else {
            return Ok(None);
        };
        match self.plattform.kanal_laden(id).await {
            Ok(kanal) => Ok(Some(kanal)),
            Err(e) if e.ist_nicht_gefunden() => {
                tracing::debug!(kanal_id = %id, "Kanal existiert nicht mehr");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mitglied_aufloesen(&self, id: MemberId) -> ReconcileResult<Option<Member>> {
        match self.plattform.mitglied_laden(id).await {
            Ok(mitglied) => Ok(Some(mitglied)),
            Err(e) if e.ist_nicht_gefunden() => {
                tracing::debug!(mitglied_id = %id, "Mitglied nicht mehr auffindbar, alle werden abgeglichen");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ein Ereignis ist relevant, wenn einer der beteiligten Kanaele zur
    /// Kategorie gehoert oder nicht mehr aufloesbar ist
    fn ist_relevant(
        &self,
        ereignis: &MembershipChange,
        alt: Option<&Channel>,
        neu: Option<&Channel>,
    ) -> bool {
        let kategorie = self.config.category_id;
        let betrifft = |id: Option<ChannelId>, kanal: Option<&Channel>| match (id, kanal) {
            (Some(_), Some(k)) => k.gehoert_zu(kategorie),
            (Some(_), None) => true,
            (None, _) => false,
        };
        betrifft(ereignis.alt, alt) || betrifft(ereignis.neu, neu)
    }

    fn bericht_protokollieren(&self, bericht: &PoolBericht) {
        if !bericht.ist_unveraendert() {
            tracing::debug!(
                erstellt = ?bericht.erstellt,
                geloescht = ?bericht.geloescht,
                zurueckgesetzt = bericht.zurueckgesetzt,
                "Voice-Pool abgeglichen"
            );
        }
        for e in &bericht.fehler {
            self.fehler_zaehlen(e);
            tracing::warn!(
                kategorie_id = %self.config.category_id,
                fehler = %e,
                "Voice-Pool-Operation fehlgeschlagen"
            );
        }
    }

    fn fehler_zaehlen(&self, e: &ReconcileError) {
        self.metriken
            .reconcile_errors_total
            .with_label_values(&[e.art()])
            .inc();
    }

    // -----------------------------------------------------------------------
    // Voller Abgleich
    // -----------------------------------------------------------------------

    /// Prueft, dass die konfigurierte Kategorie existiert
    pub async fn kategorie_pruefen(&self) -> ReconcileResult<()> {
        let id = self.config.category_id;
        match self.plattform.kanal_laden(id).await {
            Ok(kanal) if kanal.typ == ChannelKind::Kategorie => Ok(()),
            Ok(kanal) => Err(ReconcileError::konfiguration(format!(
                "{} ist keine Kategorie sondern ein {}-Kanal",
                id,
                kanal.typ.als_str()
            ))),
            Err(e) if e.ist_nicht_gefunden() => Err(ReconcileError::konfiguration(format!(
                "Kategorie {} existiert nicht",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Gleicht alle Begleitkanaele und danach den Pool ab
    ///
    /// Jeder Voice-Kanal wird unter seiner eigenen Sperre neu geladen.
    /// Liefert den Bericht des Pool-Abgleichs.
    pub async fn voll_abgleichen(&self, ist_initial: bool) -> ReconcileResult<PoolBericht> {
        let kanaele = self
            .plattform
            .kanaele_auflisten(self.config.category_id, ChannelKind::Voice, None)
            .await?;

        let ergebnisse = join_all(kanaele.iter().map(|k| self.kanal_text_abgleichen(k.id))).await;
        for (kanal, ergebnis) in kanaele.iter().zip(ergebnisse) {
            if let Err(e) = ergebnis {
                tracing::warn!(
                    kanal = %kanal.name,
                    kanal_id = %kanal.id,
                    fehler = %e,
                    "Begleitkanal konnte beim vollen Abgleich nicht abgeglichen werden"
                );
            }
        }

        let bericht = self.pool.abgleichen(ist_initial).await?;
        self.bericht_protokollieren(&bericht);
        Ok(bericht)
    }

    async fn kanal_text_abgleichen(&self, id: ChannelId) -> ReconcileResult<()> {
        let vorbereitet = async {
            let sperre = self.sperren.sperren(id).await?;
            Ok::<_, ReconcileError>((sperre, self.kanal_aufloesen(Some(id)).await?))
        };
        let (_sperre, kanal) = vorbereitet.await.inspect_err(|e| self.fehler_zaehlen(e))?;
        match kanal {
            Some(kanal) => self.text.begleiter_aktualisieren(&kanal, None, true).await,
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Laufzeit
    // -----------------------------------------------------------------------

    /// Prueft die Kategorie und laeuft, bis die Ereignisquelle schliesst
    ///
    /// Ein Fehler der Kategoriepruefung wird vor Beginn der Ereignisschleife
    /// zurueckgegeben, alle spaeteren Fehler nur protokolliert.
    pub async fn starten(self: Arc<Self>) -> ReconcileResult<()> {
        let span = self.kategorie_span();
        async move {
            self.kategorie_pruefen().await?;
            self.ereignisschleife().await;
            Ok::<(), ReconcileError>(())
        }
        .instrument(span)
        .await
    }

    /// Wie `starten`, fuer eine bereits gepruefte Kategorie
    pub async fn ausfuehren(self: Arc<Self>) {
        let span = self.kategorie_span();
        self.ereignisschleife().instrument(span).await
    }

    fn kategorie_span(&self) -> tracing::Span {
        tracing::info_span!(
            "kategorie",
            handler = %self.handler,
            kategorie_id = %self.config.category_id
        )
    }

    async fn ereignisschleife(self: Arc<Self>) {
        // Vor dem Startabgleich abonnieren, damit kein Ereignis verloren geht
        let mut empfaenger = self.plattform.ereignisse_abonnieren();

        match self.voll_abgleichen(true).await {
            Ok(bericht) => tracing::info!(
                zurueckgesetzt = bericht.zurueckgesetzt,
                erstellt = ?bericht.erstellt,
                "Startabgleich abgeschlossen"
            ),
            Err(e) => {
                self.fehler_zaehlen(&e);
                tracing::warn!(fehler = %e, "Startabgleich fehlgeschlagen");
            }
        }

        self.metriken.categories_active.inc();
        tracing::info!("Kategorie aktiv");

        let begrenzung = Arc::new(Semaphore::new(self.optionen.max_gleichzeitige_ereignisse.max(1)));
        loop {
            match empfaenger.recv().await {
                Ok(ereignis) => {
                    let Ok(erlaubnis) = begrenzung.clone().acquire_owned().await else {
                        break;
                    };
                    let koordinator = self.clone();
                    tokio::spawn(
                        async move {
                            let _erlaubnis = erlaubnis;
                            koordinator.ereignis_verarbeiten(ereignis).await;
                        }
                        .in_current_span(),
                    );
                }
                Err(RecvError::Lagged(verpasst)) => {
                    tracing::warn!(verpasst, "Ereignisse verpasst, voller Abgleich folgt");
                    let koordinator = self.clone();
                    tokio::spawn(
                        async move {
                            if let Err(e) = koordinator.voll_abgleichen(false).await {
                                koordinator.fehler_zaehlen(&e);
                                tracing::warn!(fehler = %e, "Abgleich nach verpassten Ereignissen fehlgeschlagen");
                            }
                        }
                        .in_current_span(),
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.metriken.categories_active.dec();
        tracing::info!("Ereignisquelle geschlossen, Kategorie beendet");
    }
}
