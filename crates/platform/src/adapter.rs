//! Adapter-Trait zur Chat-Plattform
//!
//! Jeder Aufruf ist ein Suspendierungspunkt. Timeouts und Wiederholungen
//! regelt die Implementierung selbst.

use async_trait::async_trait;
use autokanal_core::{ChannelId, MemberId, MembershipChange, RoleId};
use tokio::sync::broadcast;

use crate::error::PlatformResult;
use crate::model::{Channel, ChannelKind, ChannelProps, Member, OverwriteTarget};

/// Schnittstelle, ueber die der Abgleich die Plattform liest und veraendert
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Mitglieds-ID des Bots selbst
    fn bot_id(&self) -> MemberId;

    /// Die Standardrolle, die jedes Mitglied traegt ("@everyone")
    fn jeder_rolle(&self) -> RoleId;

    /// Laedt einen Kanal anhand seiner ID
    async fn kanal_laden(&self, id: ChannelId) -> PlatformResult<Channel>;

    /// Listet die Kanaele einer Kategorie, sortiert nach Position
    ///
    /// `name` filtert auf exakte Namensgleichheit.
    async fn kanaele_auflisten(
        &self,
        kategorie: ChannelId,
        typ: ChannelKind,
        name: Option<&str>,
    ) -> PlatformResult<Vec<Channel>>;

    /// Legt einen Kanal unterhalb der Kategorie an
    async fn kanal_erstellen(
        &self,
        kategorie: ChannelId,
        eigenschaften: ChannelProps,
    ) -> PlatformResult<Channel>;

    /// Loescht einen Kanal
    async fn kanal_loeschen(&self, id: ChannelId) -> PlatformResult<()>;

    /// Setzt das Sicht-Bit im Overwrite eines Subjekts auf einem Kanal
    async fn berechtigung_setzen(
        &self,
        kanal: ChannelId,
        ziel: OverwriteTarget,
        sicht: bool,
    ) -> PlatformResult<()>;

    /// Uebernimmt die Berechtigungen der uebergeordneten Kategorie
    async fn mit_kategorie_synchronisieren(&self, kanal: ChannelId) -> PlatformResult<()>;

    /// Laedt ein Mitglied (inklusive Administrator-Status)
    async fn mitglied_laden(&self, id: MemberId) -> PlatformResult<Member>;

    /// Abonniert alle zukuenftigen Mitgliedschafts-Ereignisse
    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<MembershipChange>;
}
