//! Kanal-Sperren – exklusive, zeitbegrenzte Sperre pro Kanal-Schluessel
//!
//! Die Registry legt pro Schluessel lazily einen `tokio::sync::Mutex` an.
//! Das Anlegen geschieht unter der Shard-Sperre der DashMap
//! (`entry().or_insert_with()`), zwei gleichzeitige Erst-Zugriffe auf
//! denselben neuen Schluessel erhalten also dieselbe Mutex-Instanz.
//!
//! Die Sperre wird beim Drop von `KanalSperre` freigegeben, auf jedem
//! Austrittspfad inklusive `?` und Panics.

use autokanal_core::ChannelId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ReconcileError, ReconcileResult};

/// Standard-Wartezeit auf eine Kanal-Sperre
pub const STANDARD_SPERR_ZEITLIMIT: Duration = Duration::from_secs(30);

/// Gehaltene Sperre fuer einen Kanal-Schluessel
#[derive(Debug)]
pub struct KanalSperre {
    schluessel: ChannelId,
    _guard: OwnedMutexGuard<()>,
}

impl KanalSperre {
    pub fn schluessel(&self) -> ChannelId {
        self.schluessel
    }
}

/// Registry aller Kanal-Sperren
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct KeyedMutexRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sperren: DashMap<ChannelId, Arc<Mutex<()>>>,
    zeitlimit: Duration,
}

impl Default for KeyedMutexRegistry {
    fn default() -> Self {
        Self::neu(STANDARD_SPERR_ZEITLIMIT)
    }
}

impl KeyedMutexRegistry {
    /// Erstellt eine leere Registry mit gegebener maximaler Wartezeit
    pub fn neu(zeitlimit: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sperren: DashMap::new(),
                zeitlimit,
            }),
        }
    }

    pub fn zeitlimit(&self) -> Duration {
        self.inner.zeitlimit
    }

    /// Anzahl angelegter Sperren
    pub fn anzahl(&self) -> usize {
        self.inner.sperren.len()
    }

    /// True wenn fuer den Schluessel bereits eine Sperre angelegt wurde
    pub fn enthaelt(&self, schluessel: ChannelId) -> bool {
        self.inner.sperren.contains_key(&schluessel)
    }

    fn mutex_fuer(&self, schluessel: ChannelId) -> Arc<Mutex<()>> {
        self.inner
            .sperren
            .entry(schluessel)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Wartet auf die Sperre fuer `schluessel`, hoechstens `zeitlimit`
    pub async fn sperren(&self, schluessel: ChannelId) -> ReconcileResult<KanalSperre> {
        let mutex = self.mutex_fuer(schluessel);
        match tokio::time::timeout(self.inner.zeitlimit, mutex.lock_owned()).await {
            Ok(guard) => Ok(KanalSperre {
                schluessel,
                _guard: guard,
            }),
            Err(_) => Err(ReconcileError::SperreZeitlimit {
                schluessel,
                wartezeit: self.inner.zeitlimit,
            }),
        }
    }

    /// Entfernt die Sperre eines geloeschten Kanals, falls niemand sie haelt
    ///
    /// Haelt oder erwartet ein Task die Sperre, besitzt er eine Arc-Kopie;
    /// der Eintrag bleibt dann bestehen.
    pub fn entfernen_wenn_frei(&self, schluessel: ChannelId) -> bool {
        self.inner
            .sperren
            .remove_if(&schluessel, |_, mutex| Arc::strong_count(mutex) == 1)
            .is_some()
    }
}
