//! In-Memory-Plattform
//!
//! Vollstaendige In-Process-Implementierung von `ChatPlatform`. Der Zustand
//! liegt hinter einem `parking_lot::Mutex`, der nie ueber einen `await`
//! gehalten wird. Jeder veraendernde Aufruf wird protokolliert, sodass Tests
//! pruefen koennen, welche Plattform-Operationen ein Abgleich ausgeloest hat.
//!
//! Zusaetzlich lassen sich Latenz und gezielte Fehler einspeisen.

use async_trait::async_trait;
use autokanal_core::{ChannelId, MemberId, MembershipChange, RoleId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::adapter::ChatPlatform;
use crate::error::{PlatformError, PlatformResult};
use crate::model::{Channel, ChannelKind, ChannelProps, Member, Overwrite, OverwriteTarget};

/// Groesse des Broadcast-Kanals fuer Mitgliedschafts-Ereignisse
const EVENT_KANAL_GROESSE: usize = 256;

/// Erste vergebene Snowflake-ID fuer Kanaele und Mitglieder
const ERSTE_ID: u64 = 1000;

// ---------------------------------------------------------------------------
// Protokoll und Fehlerinjektion
// ---------------------------------------------------------------------------

/// Ein protokollierter, veraendernder Plattform-Aufruf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aufruf {
    KanalErstellt {
        id: ChannelId,
        name: String,
        typ: ChannelKind,
    },
    KanalGeloescht {
        id: ChannelId,
        name: String,
    },
    BerechtigungGesetzt {
        kanal: ChannelId,
        ziel: OverwriteTarget,
        sicht: bool,
    },
    Synchronisiert {
        kanal: ChannelId,
    },
}

/// Regel, nach der ein Aufruf absichtlich fehlschlaegt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FehlerRegel {
    /// Anlegen eines Kanals mit diesem Namen schlaegt fehl
    Erstellen(String),
    /// Loeschen dieses Kanals schlaegt fehl
    Loeschen(ChannelId),
    /// Berechtigungsaenderungen fuer dieses Mitglied schlagen fehl
    Berechtigung(MemberId),
    /// Jeder asynchrone Aufruf scheitert an der Verbindung
    Getrennt,
}

// ---------------------------------------------------------------------------
// InMemoryPlatform
// ---------------------------------------------------------------------------

/// Chat-Plattform im Arbeitsspeicher
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct InMemoryPlatform {
    inner: Arc<InMemoryInner>,
}

struct InMemoryInner {
    zustand: Mutex<Zustand>,
    event_tx: broadcast::Sender<MembershipChange>,
    bot_id: MemberId,
    jeder_rolle: RoleId,
}

struct Zustand {
    kanaele: BTreeMap<ChannelId, Channel>,
    mitglieder: HashMap<MemberId, Member>,
    naechste_id: u64,
    aufrufe: Vec<Aufruf>,
    fehler: HashSet<FehlerRegel>,
    latenz: Duration,
}

impl Zustand {
    fn id_vergeben(&mut self) -> u64 {
        let id = self.naechste_id;
        self.naechste_id += 1;
        id
    }

    fn naechste_position(&self, kategorie: Option<ChannelId>) -> u32 {
        self.kanaele
            .values()
            .filter(|k| k.kategorie_id == kategorie)
            .map(|k| k.position + 1)
            .max()
            .unwrap_or(0)
    }

    /// Entfernt ein Mitglied aus seinem aktuellen Voice-Kanal
    fn aus_voice_entfernen(&mut self, mitglied: MemberId) -> Option<ChannelId> {
        let kanal = self
            .kanaele
            .values_mut()
            .find(|k| k.typ == ChannelKind::Voice && k.mitglieder.contains(&mitglied))?;
        kanal.mitglieder.remove(&mitglied);
        Some(kanal.id)
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::neu()
    }
}

impl InMemoryPlatform {
    /// Erstellt eine leere Plattform mit Bot-Mitglied und Standardrolle
    pub fn neu() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        let bot_id = MemberId(1);
        let mut mitglieder = HashMap::new();
        mitglieder.insert(
            bot_id,
            Member {
                id: bot_id,
                name: "autokanal".into(),
                ist_administrator: false,
            },
        );

        Self {
            inner: Arc::new(InMemoryInner {
                zustand: Mutex::new(Zustand {
                    kanaele: BTreeMap::new(),
                    mitglieder,
                    naechste_id: ERSTE_ID,
                    aufrufe: Vec::new(),
                    fehler: HashSet::new(),
                    latenz: Duration::ZERO,
                }),
                event_tx,
                bot_id,
                jeder_rolle: RoleId(2),
            }),
        }
    }

    // --- Aufbau ---

    /// Legt eine Kategorie an
    pub fn kategorie_anlegen(&self, name: &str) -> ChannelId {
        let mut z = self.inner.zustand.lock();
        let id = ChannelId(z.id_vergeben());
        let position = z.naechste_position(None);
        z.kanaele.insert(
            id,
            Channel {
                id,
                name: name.into(),
                typ: ChannelKind::Kategorie,
                kategorie_id: None,
                position,
                user_limit: None,
                bitrate: None,
                mitglieder: BTreeSet::new(),
                overwrites: Vec::new(),
            },
        );
        id
    }

    /// Legt einen Kanal direkt an, ohne ihn zu protokollieren
    pub fn kanal_anlegen(&self, kategorie: ChannelId, name: &str, typ: ChannelKind) -> ChannelId {
        let mut z = self.inner.zustand.lock();
        let id = ChannelId(z.id_vergeben());
        let position = z.naechste_position(Some(kategorie));
        z.kanaele.insert(
            id,
            Channel {
                id,
                name: name.into(),
                typ,
                kategorie_id: Some(kategorie),
                position,
                user_limit: None,
                bitrate: None,
                mitglieder: BTreeSet::new(),
                overwrites: Vec::new(),
            },
        );
        id
    }

    /// Legt ein Gilden-Mitglied an
    pub fn mitglied_anlegen(&self, name: &str, ist_administrator: bool) -> MemberId {
        let mut z = self.inner.zustand.lock();
        let id = MemberId(z.id_vergeben());
        z.mitglieder.insert(
            id,
            Member {
                id,
                name: name.into(),
                ist_administrator,
            },
        );
        id
    }

    /// Setzt ein Overwrite auf einer Kategorie (wird bei Synchronisation vererbt)
    pub fn kategorie_overwrite_setzen(&self, kategorie: ChannelId, overwrite: Overwrite) {
        let mut z = self.inner.zustand.lock();
        if let Some(k) = z.kanaele.get_mut(&kategorie) {
            k.overwrites.retain(|o| o.ziel != overwrite.ziel);
            k.overwrites.push(overwrite);
        }
    }

    // --- Voice-Zustand ---

    /// Bewegt ein Mitglied in einen Voice-Kanal und meldet das Ereignis
    pub fn beitreten(&self, mitglied: MemberId, kanal: ChannelId) -> MembershipChange {
        let ereignis = {
            let mut z = self.inner.zustand.lock();
            let alt = z.aus_voice_entfernen(mitglied);
            if let Some(k) = z.kanaele.get_mut(&kanal) {
                k.mitglieder.insert(mitglied);
            }
            MembershipChange {
                alt,
                neu: Some(kanal),
                mitglied,
            }
        };
        self.melden(ereignis);
        ereignis
    }

    /// Trennt ein Mitglied von seinem Voice-Kanal und meldet das Ereignis
    pub fn verlassen(&self, mitglied: MemberId) -> Option<MembershipChange> {
        let alt = self.inner.zustand.lock().aus_voice_entfernen(mitglied)?;
        let ereignis = MembershipChange::verlassen(mitglied, alt);
        self.melden(ereignis);
        Some(ereignis)
    }

    /// Meldet ein Ereignis an alle Abonnenten
    pub fn melden(&self, ereignis: MembershipChange) {
        // Ohne Abonnenten geht das Ereignis verloren, wie bei der echten Plattform
        let _ = self.inner.event_tx.send(ereignis);
    }

    // --- Inspektion ---

    /// Momentaufnahme eines Kanals
    pub fn kanal(&self, id: ChannelId) -> Option<Channel> {
        self.inner.zustand.lock().kanaele.get(&id).cloned()
    }

    /// Alle Kanaele eines Typs unter einer Kategorie, sortiert nach Position
    pub fn kanaele_in(&self, kategorie: ChannelId, typ: ChannelKind) -> Vec<Channel> {
        let z = self.inner.zustand.lock();
        sortiert(
            z.kanaele
                .values()
                .filter(|k| k.typ == typ && k.gehoert_zu(kategorie))
                .cloned()
                .collect(),
        )
    }

    /// Sucht einen Kanal nach Typ und exaktem Namen
    pub fn kanal_nach_name(&self, kategorie: ChannelId, typ: ChannelKind, name: &str) -> Option<Channel> {
        self.kanaele_in(kategorie, typ)
            .into_iter()
            .find(|k| k.name == name)
    }

    /// Alle bisher protokollierten Aufrufe
    pub fn aufrufe(&self) -> Vec<Aufruf> {
        self.inner.zustand.lock().aufrufe.clone()
    }

    /// Leert das Aufrufprotokoll
    pub fn aufrufe_leeren(&self) {
        self.inner.zustand.lock().aufrufe.clear();
    }

    // --- Stoerungen ---

    /// Aktiviert eine Fehlerregel
    pub fn fehler_injizieren(&self, regel: FehlerRegel) {
        self.inner.zustand.lock().fehler.insert(regel);
    }

    /// Deaktiviert eine Fehlerregel
    pub fn fehler_entfernen(&self, regel: &FehlerRegel) {
        self.inner.zustand.lock().fehler.remove(regel);
    }

    /// Kuenstliche Latenz vor jedem asynchronen Aufruf
    pub fn latenz_setzen(&self, latenz: Duration) {
        self.inner.zustand.lock().latenz = latenz;
    }

    /// Wartet die Latenz ab und prueft die Verbindung
    async fn verbinden(&self) -> PlatformResult<()> {
        let latenz = self.inner.zustand.lock().latenz;
        if !latenz.is_zero() {
            tokio::time::sleep(latenz).await;
        }
        if self.inner.zustand.lock().fehler.contains(&FehlerRegel::Getrennt) {
            return Err(PlatformError::Verbindung("Gateway getrennt".into()));
        }
        Ok(())
    }
}

fn sortiert(mut kanaele: Vec<Channel>) -> Vec<Channel> {
    kanaele.sort_by_key(|k| (k.position, k.id));
    kanaele
}

#[async_trait]
impl ChatPlatform for InMemoryPlatform {
    fn bot_id(&self) -> MemberId {
        self.inner.bot_id
    }

    fn jeder_rolle(&self) -> RoleId {
        self.inner.jeder_rolle
    }

    async fn kanal_laden(&self, id: ChannelId) -> PlatformResult<Channel> {
        self.verbinden().await?;
        self.kanal(id).ok_or(PlatformError::KanalNichtGefunden(id))
    }

    async fn kanaele_auflisten(
        &self,
        kategorie: ChannelId,
        typ: ChannelKind,
        name: Option<&str>,
    ) -> PlatformResult<Vec<Channel>> {
        self.verbinden().await?;
        let mut kanaele = self.kanaele_in(kategorie, typ);
        if let Some(name) = name {
            kanaele.retain(|k| k.name == name);
        }
        Ok(kanaele)
    }

    async fn kanal_erstellen(
        &self,
        kategorie: ChannelId,
        eigenschaften: ChannelProps,
    ) -> PlatformResult<Channel> {
        self.verbinden().await?;
        let mut z = self.inner.zustand.lock();

        if z.fehler.contains(&FehlerRegel::Erstellen(eigenschaften.name.clone())) {
            return Err(PlatformError::abgelehnt("kanal_erstellen", "injizierter Fehler"));
        }
        if !z.kanaele.contains_key(&kategorie) {
            return Err(PlatformError::KanalNichtGefunden(kategorie));
        }

        let id = ChannelId(z.id_vergeben());
        let position = eigenschaften
            .position
            .unwrap_or_else(|| z.naechste_position(Some(kategorie)));
        let kanal = Channel {
            id,
            name: eigenschaften.name,
            typ: eigenschaften.typ,
            kategorie_id: Some(kategorie),
            position,
            user_limit: eigenschaften.user_limit,
            bitrate: eigenschaften.bitrate,
            mitglieder: BTreeSet::new(),
            overwrites: eigenschaften.overwrites.unwrap_or_default(),
        };

        z.aufrufe.push(Aufruf::KanalErstellt {
            id,
            name: kanal.name.clone(),
            typ: kanal.typ,
        });
        z.kanaele.insert(id, kanal.clone());
        Ok(kanal)
    }

    async fn kanal_loeschen(&self, id: ChannelId) -> PlatformResult<()> {
        self.verbinden().await?;
        let mut z = self.inner.zustand.lock();

        if z.fehler.contains(&FehlerRegel::Loeschen(id)) {
            return Err(PlatformError::abgelehnt("kanal_loeschen", "injizierter Fehler"));
        }
        let kanal = z
            .kanaele
            .remove(&id)
            .ok_or(PlatformError::KanalNichtGefunden(id))?;
        z.aufrufe.push(Aufruf::KanalGeloescht {
            id,
            name: kanal.name,
        });
        Ok(())
    }

    async fn berechtigung_setzen(
        &self,
        kanal: ChannelId,
        ziel: OverwriteTarget,
        sicht: bool,
    ) -> PlatformResult<()> {
        self.verbinden().await?;
        let mut z = self.inner.zustand.lock();

        if let OverwriteTarget::Mitglied(mitglied) = ziel {
            if z.fehler.contains(&FehlerRegel::Berechtigung(mitglied)) {
                return Err(PlatformError::abgelehnt(
                    "berechtigung_setzen",
                    "injizierter Fehler",
                ));
            }
        }

        let k = z
            .kanaele
            .get_mut(&kanal)
            .ok_or(PlatformError::KanalNichtGefunden(kanal))?;
        match k.overwrites.iter_mut().find(|o| o.ziel == ziel) {
            Some(o) => o.sicht_setzen(sicht),
            None => {
                let mut o = Overwrite::erlauben(ziel, &[]);
                o.sicht_setzen(sicht);
                k.overwrites.push(o);
            }
        }
        z.aufrufe.push(Aufruf::BerechtigungGesetzt { kanal, ziel, sicht });
        Ok(())
    }

    async fn mit_kategorie_synchronisieren(&self, kanal: ChannelId) -> PlatformResult<()> {
        self.verbinden().await?;
        let mut z = self.inner.zustand.lock();

        let kategorie = z
            .kanaele
            .get(&kanal)
            .ok_or(PlatformError::KanalNichtGefunden(kanal))?
            .kategorie_id
            .ok_or_else(|| PlatformError::abgelehnt("mit_kategorie_synchronisieren", "Kanal ohne Kategorie"))?;
        let geerbt = z
            .kanaele
            .get(&kategorie)
            .map(|k| k.overwrites.clone())
            .unwrap_or_default();

        if let Some(k) = z.kanaele.get_mut(&kanal) {
            k.overwrites = geerbt;
        }
        z.aufrufe.push(Aufruf::Synchronisiert { kanal });
        Ok(())
    }

    async fn mitglied_laden(&self, id: MemberId) -> PlatformResult<Member> {
        self.verbinden().await?;
        self.inner
            .zustand
            .lock()
            .mitglieder
            .get(&id)
            .cloned()
            .ok_or(PlatformError::MitgliedNichtGefunden(id))
    }

    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<MembershipChange> {
        self.inner.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Permission;

    #[tokio::test]
    async fn kanal_erstellen_und_auflisten() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");

        p.kanal_erstellen(kat, ChannelProps::neu("Talk", ChannelKind::Voice))
            .await
            .unwrap();
        p.kanal_erstellen(kat, ChannelProps::neu("Talk 2", ChannelKind::Voice))
            .await
            .unwrap();
        p.kanal_erstellen(kat, ChannelProps::neu("text-talk", ChannelKind::Text))
            .await
            .unwrap();

        let voice = p.kanaele_auflisten(kat, ChannelKind::Voice, None).await.unwrap();
        let namen: Vec<_> = voice.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(namen, vec!["Talk", "Talk 2"]);

        let gefiltert = p
            .kanaele_auflisten(kat, ChannelKind::Voice, Some("Talk 2"))
            .await
            .unwrap();
        assert_eq!(gefiltert.len(), 1);
        assert_eq!(p.aufrufe().len(), 3);
    }

    #[tokio::test]
    async fn unbekannter_kanal_liefert_nicht_gefunden() {
        let p = InMemoryPlatform::neu();
        let e = p.kanal_laden(ChannelId(4711)).await.unwrap_err();
        assert!(e.ist_nicht_gefunden());
        assert!(p.kanal_loeschen(ChannelId(4711)).await.unwrap_err().ist_nicht_gefunden());
    }

    #[tokio::test]
    async fn beitreten_verschiebt_mitglied_und_meldet() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");
        let a = p.kanal_anlegen(kat, "Talk", ChannelKind::Voice);
        let b = p.kanal_anlegen(kat, "Talk 2", ChannelKind::Voice);
        let m = p.mitglied_anlegen("alice", false);
        let mut rx = p.ereignisse_abonnieren();

        p.beitreten(m, a);
        let e = p.beitreten(m, b);
        assert_eq!(e, MembershipChange::wechseln(m, a, b));
        assert!(p.kanal(a).unwrap().ist_leer());
        assert!(p.kanal(b).unwrap().mitglieder.contains(&m));

        assert_eq!(rx.recv().await.unwrap(), MembershipChange::betreten(m, a));
        assert_eq!(rx.recv().await.unwrap(), MembershipChange::wechseln(m, a, b));

        let e = p.verlassen(m).unwrap();
        assert_eq!(e, MembershipChange::verlassen(m, b));
        assert!(p.verlassen(m).is_none());
    }

    #[tokio::test]
    async fn berechtigung_setzen_legt_overwrite_an_und_aendert() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");
        let t = p.kanal_anlegen(kat, "text-talk", ChannelKind::Text);
        let m = p.mitglied_anlegen("bob", false);

        p.berechtigung_setzen(t, OverwriteTarget::Mitglied(m), true).await.unwrap();
        assert_eq!(p.kanal(t).unwrap().sicht_fuer(m), Some(true));

        p.berechtigung_setzen(t, OverwriteTarget::Mitglied(m), false).await.unwrap();
        assert_eq!(p.kanal(t).unwrap().sicht_fuer(m), Some(false));
        assert_eq!(p.kanal(t).unwrap().overwrites.len(), 1);
    }

    #[tokio::test]
    async fn injizierte_fehler_greifen() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");
        let t = p.kanal_anlegen(kat, "text-talk", ChannelKind::Text);
        let m = p.mitglied_anlegen("carol", false);

        p.fehler_injizieren(FehlerRegel::Berechtigung(m));
        p.fehler_injizieren(FehlerRegel::Loeschen(t));
        p.fehler_injizieren(FehlerRegel::Erstellen("Talk".into()));

        assert!(p.berechtigung_setzen(t, OverwriteTarget::Mitglied(m), true).await.is_err());
        assert!(p.kanal_loeschen(t).await.is_err());
        assert!(p
            .kanal_erstellen(kat, ChannelProps::neu("Talk", ChannelKind::Voice))
            .await
            .is_err());
        assert!(p.aufrufe().is_empty());

        p.fehler_entfernen(&FehlerRegel::Loeschen(t));
        assert!(p.kanal_loeschen(t).await.is_ok());
    }

    #[tokio::test]
    async fn getrennte_verbindung_trifft_jeden_aufruf() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");
        p.fehler_injizieren(FehlerRegel::Getrennt);

        let e = p.kanal_laden(kat).await.unwrap_err();
        assert!(matches!(e, PlatformError::Verbindung(_)));
        assert!(!e.ist_nicht_gefunden());
        assert!(p.kanaele_auflisten(kat, ChannelKind::Voice, None).await.is_err());
        assert!(p.mitglied_laden(p.bot_id()).await.is_err());

        p.fehler_entfernen(&FehlerRegel::Getrennt);
        assert!(p.kanal_laden(kat).await.is_ok());
    }

    #[tokio::test]
    async fn synchronisieren_uebernimmt_kategorie_overwrites() {
        let p = InMemoryPlatform::neu();
        let kat = p.kategorie_anlegen("Gaming");
        let rolle = OverwriteTarget::Rolle(RoleId(77));
        p.kategorie_overwrite_setzen(kat, Overwrite::erlauben(rolle, &[Permission::Connect]));

        let mut props = ChannelProps::neu("Talk", ChannelKind::Voice);
        props.overwrites = Some(vec![Overwrite::verweigern(
            OverwriteTarget::Rolle(p.jeder_rolle()),
            &[Permission::ViewChannel],
        )]);
        let kanal = p.kanal_erstellen(kat, props).await.unwrap();
        p.mit_kategorie_synchronisieren(kanal.id).await.unwrap();

        let kanal = p.kanal(kanal.id).unwrap();
        assert_eq!(kanal.overwrites.len(), 1);
        assert_eq!(kanal.overwrites[0].ziel, rolle);
    }

    #[tokio::test]
    async fn bot_ist_als_mitglied_bekannt() {
        let p = InMemoryPlatform::neu();
        let bot = p.mitglied_laden(p.bot_id()).await.unwrap();
        assert!(!bot.ist_administrator);
        assert!(p.mitglied_laden(MemberId(9)).await.unwrap_err().ist_nicht_gefunden());
    }
}
