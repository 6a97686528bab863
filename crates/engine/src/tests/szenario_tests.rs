//! Ablauf-Szenarien: Wachstum, Verlassen, Startabgleich, Admin, Sperr-Zeitlimit

use std::time::Duration;

use autokanal_platform::{Aufruf, ChannelKind, OverwriteTarget};

use super::{umgebung, umgebung_mit};
use crate::{CycleOutcome, ReconcileError};

#[tokio::test]
async fn test_beitritt_in_ersten_kanal_erzeugt_zweiten() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);

    let ereignis = u.plattform.beitreten(alice, talk);
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;

    assert!(matches!(outcome, CycleOutcome::Abgeschlossen), "{outcome:?}");
    assert_eq!(u.erstellt(), vec!["text-talk", "Talk 2"]);
    assert!(u.geloescht().is_empty());
    assert_eq!(u.voice_namen(), vec!["Talk", "Talk 2"]);
    assert_eq!(u.text_sicht("text-talk", alice), Some(true));
}

#[tokio::test]
async fn test_verlassen_entfernt_begleiter_und_ueberzaehligen_kanal() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    u.plattform.kanal_anlegen(u.kategorie, "Talk 2", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);
    let beitritt = u.plattform.beitreten(alice, talk);
    u.koordinator.ereignis_verarbeiten(beitritt).await;
    assert_eq!(u.text_namen(), vec!["text-talk"]);
    u.plattform.aufrufe_leeren();

    let ereignis = u.plattform.verlassen(alice).expect("alice war verbunden");
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;

    assert!(matches!(outcome, CycleOutcome::Abgeschlossen), "{outcome:?}");
    assert!(u.erstellt().is_empty());
    assert!(u.text_namen().is_empty());
    // Zwei leere Kanaele am Ende: der letzte faellt weg, einer bleibt als Reserve
    assert_eq!(u.geloescht(), vec!["text-talk", "Talk 2"]);
    assert_eq!(u.voice_namen(), vec!["Talk"]);
}

#[tokio::test]
async fn test_verlassen_in_der_mitte_laesst_reserve_stehen() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    let talk2 = u.plattform.kanal_anlegen(u.kategorie, "Talk 2", ChannelKind::Voice);
    u.plattform.kanal_anlegen(u.kategorie, "Talk 3", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);
    let bob = u.plattform.mitglied_anlegen("bob", false);
    u.plattform.beitreten(alice, talk);
    u.plattform.beitreten(bob, talk2);
    u.koordinator.voll_abgleichen(false).await.expect("Abgleich fehlgeschlagen");
    u.plattform.aufrufe_leeren();

    let ereignis = u.plattform.verlassen(alice).expect("alice war verbunden");
    u.koordinator.ereignis_verarbeiten(ereignis).await;

    assert!(u.erstellt().is_empty());
    assert_eq!(u.geloescht(), vec!["text-talk"]);
    assert_eq!(u.voice_namen(), vec!["Talk", "Talk 2", "Talk 3"]);
}

#[tokio::test]
async fn test_startabgleich_setzt_leeren_pool_zurueck() {
    let u = umgebung();
    for name in ["Talk", "Talk 2", "Talk 3"] {
        u.plattform.kanal_anlegen(u.kategorie, name, ChannelKind::Voice);
    }

    let bericht = u
        .koordinator
        .voll_abgleichen(true)
        .await
        .expect("Startabgleich fehlgeschlagen");

    assert!(bericht.zurueckgesetzt);
    assert_eq!(u.geloescht().len(), 3);
    for name in ["Talk", "Talk 2", "Talk 3"] {
        assert!(u.geloescht().contains(&name.to_string()));
    }
    // Der Pool beginnt danach mit einem frischen ersten Kanal
    assert_eq!(bericht.erstellt.as_deref(), Some("Talk"));
    assert_eq!(u.voice_namen(), vec!["Talk"]);
}

#[tokio::test]
async fn test_startabgleich_ohne_reset_bei_belegtem_pool() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    u.plattform.kanal_anlegen(u.kategorie, "Talk 2", ChannelKind::Voice);
    // Verwaister Begleiter aus einer frueheren Laufzeit
    u.plattform.kanal_anlegen(u.kategorie, "text-talk-2", ChannelKind::Text);
    let alice = u.plattform.mitglied_anlegen("alice", false);
    u.plattform.beitreten(alice, talk);

    let bericht = u
        .koordinator
        .voll_abgleichen(true)
        .await
        .expect("Startabgleich fehlgeschlagen");

    assert!(!bericht.zurueckgesetzt);
    assert!(bericht.ist_unveraendert());
    assert_eq!(u.voice_namen(), vec!["Talk", "Talk 2"]);
    assert_eq!(u.text_namen(), vec!["text-talk"]);
    assert_eq!(u.text_sicht("text-talk", alice), Some(true));
}

#[tokio::test]
async fn test_administrator_erhaelt_kein_overwrite() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);
    let root = u.plattform.mitglied_anlegen("root", true);
    let beitritt = u.plattform.beitreten(alice, talk);
    u.koordinator.ereignis_verarbeiten(beitritt).await;
    u.plattform.aufrufe_leeren();

    let ereignis = u.plattform.beitreten(root, talk);
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;

    assert!(matches!(outcome, CycleOutcome::Abgeschlossen), "{outcome:?}");
    assert_eq!(u.overwrite_aufrufe(), 0);
    assert_eq!(u.text_sicht("text-talk", root), None);
}

#[tokio::test(start_paused = true)]
async fn test_gehaltene_sperre_fuehrt_zu_zeitlimit() {
    let u = umgebung();
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);

    // Ein haengender Vorgang haelt die Sperre 31 Sekunden
    let sperre = u
        .koordinator
        .sperren()
        .sperren(talk)
        .await
        .expect("Sperre nicht erhalten");
    let blockierer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(31)).await;
        drop(sperre);
    });

    let ereignis = u.plattform.beitreten(alice, talk);
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;

    match outcome {
        CycleOutcome::Fehlgeschlagen(ReconcileError::SperreZeitlimit { schluessel, wartezeit }) => {
            assert_eq!(schluessel, talk);
            assert_eq!(wartezeit, Duration::from_secs(30));
        }
        andere => panic!("Zeitlimit erwartet, erhalten: {andere:?}"),
    }
    assert!(u.plattform.aufrufe().is_empty());
    assert_eq!(
        u.metriken
            .reconcile_errors_total
            .with_label_values(&["lock_timeout"])
            .get(),
        1
    );
    assert_eq!(u.metriken.events_total.with_label_values(&["failed"]).get(), 1);

    // Nach Freigabe laeuft das naechste Ereignis normal durch
    blockierer.await.expect("Blockierer abgebrochen");
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;
    assert!(matches!(outcome, CycleOutcome::Abgeschlossen), "{outcome:?}");
}

#[tokio::test]
async fn test_wechsel_zwischen_kanaelen_verschiebt_sicht() {
    let u = umgebung_mit(|c| c.auto_voice_channel_limit = 5);
    let talk = u.plattform.kanal_anlegen(u.kategorie, "Talk", ChannelKind::Voice);
    let talk2 = u.plattform.kanal_anlegen(u.kategorie, "Talk 2", ChannelKind::Voice);
    let alice = u.plattform.mitglied_anlegen("alice", false);
    let bob = u.plattform.mitglied_anlegen("bob", false);
    u.plattform.beitreten(alice, talk);
    u.plattform.beitreten(bob, talk2);
    u.koordinator.voll_abgleichen(false).await.expect("Abgleich fehlgeschlagen");
    assert_eq!(u.voice_namen(), vec!["Talk", "Talk 2", "Talk 3"]);
    u.plattform.aufrufe_leeren();

    let ereignis = u.plattform.beitreten(alice, talk2);
    assert_eq!(ereignis.alt, Some(talk));
    let outcome = u.koordinator.ereignis_verarbeiten(ereignis).await;

    assert!(matches!(outcome, CycleOutcome::Abgeschlossen), "{outcome:?}");
    assert_eq!(u.text_namen(), vec!["text-talk-2"]);
    assert_eq!(u.text_sicht("text-talk-2", alice), Some(true));
    assert_eq!(u.text_sicht("text-talk-2", bob), Some(true));
    assert!(u.plattform.aufrufe().contains(&Aufruf::BerechtigungGesetzt {
        kanal: u
            .plattform
            .kanal_nach_name(u.kategorie, ChannelKind::Text, "text-talk-2")
            .expect("Begleiter fehlt")
            .id,
        ziel: OverwriteTarget::Mitglied(alice),
        sicht: true,
    }));
    // "Talk" ist jetzt leer, am Ende bleibt genau "Talk 3" als Reserve
    assert_eq!(u.voice_namen(), vec!["Talk", "Talk 2", "Talk 3"]);
    assert!(u.erstellt().is_empty());
}
