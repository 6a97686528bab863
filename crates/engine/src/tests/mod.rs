//! Szenario- und Eigenschafts-Tests fuer den Koordinator
//!
//! Alle Tests laufen gegen die `InMemoryPlatform`.

mod szenario_tests;

use std::sync::Arc;
use std::time::Duration;

use autokanal_core::{ChannelId, MemberId};
use autokanal_observability::AutokanalMetrics;
use autokanal_platform::{Aufruf, ChannelKind, InMemoryPlatform};

use crate::{CategoryConfig, Coordinator, CoordinatorOptionen};

pub(crate) struct Umgebung {
    pub plattform: Arc<InMemoryPlatform>,
    pub kategorie: ChannelId,
    pub metriken: AutokanalMetrics,
    pub koordinator: Arc<Coordinator<InMemoryPlatform>>,
}

/// Kategorie "Gaming" mit Pool "Talk" (Limit 3) und Begleitkanaelen "text-*"
pub(crate) fn umgebung() -> Umgebung {
    umgebung_mit(|_| {})
}

pub(crate) fn umgebung_mit(anpassen: impl FnOnce(&mut CategoryConfig)) -> Umgebung {
    let plattform = Arc::new(InMemoryPlatform::neu());
    let kategorie = plattform.kategorie_anlegen("Gaming");
    let mut config = CategoryConfig {
        category_id: kategorie,
        auto_text: true,
        auto_voice: true,
        auto_voice_prefix: "Talk".into(),
        auto_voice_channel_limit: 3,
        ..Default::default()
    };
    anpassen(&mut config);

    let metriken = AutokanalMetrics::neu().expect("Metriken konnten nicht erstellt werden");
    let koordinator = Coordinator::neu(
        "gaming",
        plattform.clone(),
        config,
        CoordinatorOptionen::default(),
        metriken.clone(),
    )
    .expect("Koordinator konnte nicht erstellt werden");

    Umgebung {
        plattform,
        kategorie,
        metriken,
        koordinator: Arc::new(koordinator),
    }
}

impl Umgebung {
    pub fn voice(&self, name: &str) -> ChannelId {
        self.plattform
            .kanal_nach_name(self.kategorie, ChannelKind::Voice, name)
            .unwrap_or_else(|| panic!("Voice-Kanal {name} fehlt"))
            .id
    }

    pub fn voice_namen(&self) -> Vec<String> {
        self.plattform
            .kanaele_in(self.kategorie, ChannelKind::Voice)
            .into_iter()
            .map(|k| k.name)
            .collect()
    }

    pub fn text_namen(&self) -> Vec<String> {
        self.plattform
            .kanaele_in(self.kategorie, ChannelKind::Text)
            .into_iter()
            .map(|k| k.name)
            .collect()
    }

    pub fn text_sicht(&self, name: &str, mitglied: MemberId) -> Option<bool> {
        self.plattform
            .kanal_nach_name(self.kategorie, ChannelKind::Text, name)
            .and_then(|k| k.sicht_fuer(mitglied))
    }

    pub fn erstellt(&self) -> Vec<String> {
        self.plattform
            .aufrufe()
            .into_iter()
            .filter_map(|a| match a {
                Aufruf::KanalErstellt { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn geloescht(&self) -> Vec<String> {
        self.plattform
            .aufrufe()
            .into_iter()
            .filter_map(|a| match a {
                Aufruf::KanalGeloescht { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn overwrite_aufrufe(&self) -> usize {
        self.plattform
            .aufrufe()
            .iter()
            .filter(|a| matches!(a, Aufruf::BerechtigungGesetzt { .. }))
            .count()
    }
}

/// Wartet, bis die Bedingung erfuellt ist (hoechstens 5 Sekunden)
pub(crate) async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Bedingung wurde nicht rechtzeitig erfuellt");
}
