//! In-Memory-Kollaborateure
//!
//! Thread-sichere Implementierungen von [`SessionRegistry`] und
//! [`AccountRegistry`] auf Basis von DashMap. Der Server-Binary nutzt sie als
//! Andockpunkt fuer die Spiellogik, die Tests als Fixture.

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::{AccountRegistry, Konto, SessionInfo, SessionRegistry};
use crate::types::{AccountId, Position};

// ---------------------------------------------------------------------------
// Zustellung
// ---------------------------------------------------------------------------

/// Ausgehender Kanal einer Spielverbindung fuer Proximity-Voice-Nachrichten
pub trait VoiceZusteller: Send + Sync + 'static {
    /// Gibt `false` zurueck wenn die Verbindung nicht mehr zustellbar ist
    fn zustellen(&self, json: &str) -> bool;
}

struct SitzungsEintrag {
    info: SessionInfo,
    zusteller: Option<Arc<dyn VoiceZusteller>>,
}

// ---------------------------------------------------------------------------
// InMemorySessionRegistry
// ---------------------------------------------------------------------------

/// Sitzungsregister im Speicher
///
/// Clone teilt den inneren Zustand (Arc).
#[derive(Clone, Default)]
pub struct InMemorySessionRegistry {
    sitzungen: Arc<DashMap<AccountId, SitzungsEintrag>>,
}

impl InMemorySessionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert (oder ersetzt) eine Sitzung
    pub fn sitzung_setzen(&self, info: SessionInfo) {
        let account_id = info.account_id;
        match self.sitzungen.get_mut(&account_id) {
            Some(mut eintrag) => eintrag.info = info,
            None => {
                self.sitzungen.insert(
                    account_id,
                    SitzungsEintrag {
                        info,
                        zusteller: None,
                    },
                );
            }
        }
        tracing::debug!(account = %account_id, "Sitzung gesetzt");
    }

    /// Kurzform: verbundener Spieler an einer Position
    pub fn spieler_setzen(&self, account_id: AccountId, position: Option<Position>) {
        self.sitzung_setzen(SessionInfo {
            account_id,
            player_id: account_id.als_spieler_id(),
            verbunden: true,
            position,
        });
    }

    /// Aktualisiert nur die Position einer bestehenden Sitzung
    pub fn position_setzen(&self, account_id: AccountId, position: Option<Position>) -> bool {
        match self.sitzungen.get_mut(&account_id) {
            Some(mut eintrag) => {
                eintrag.info.position = position;
                true
            }
            None => false,
        }
    }

    /// Haengt einen Zusteller (Spielverbindung) an eine Sitzung
    pub fn zusteller_setzen(&self, account_id: AccountId, zusteller: Arc<dyn VoiceZusteller>) -> bool {
        match self.sitzungen.get_mut(&account_id) {
            Some(mut eintrag) => {
                eintrag.zusteller = Some(zusteller);
                true
            }
            None => false,
        }
    }

    pub fn sitzung_entfernen(&self, account_id: AccountId) -> bool {
        self.sitzungen.remove(&account_id).is_some()
    }

    pub fn anzahl(&self) -> usize {
        self.sitzungen.len()
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn sitzungen(&self) -> Vec<SessionInfo> {
        self.sitzungen.iter().map(|e| e.info.clone()).collect()
    }

    fn sitzung(&self, account_id: AccountId) -> Option<SessionInfo> {
        self.sitzungen.get(&account_id).map(|e| e.info.clone())
    }

    fn proximity_voice_zustellen(&self, empfaenger: AccountId, json: &str) -> bool {
        // Zusteller ausserhalb des Shard-Locks aufrufen
        let zusteller = self
            .sitzungen
            .get(&empfaenger)
            .and_then(|e| e.zusteller.clone());
        match zusteller {
            Some(z) => z.zustellen(json),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryAccountRegistry
// ---------------------------------------------------------------------------

/// Kontoregister im Speicher
#[derive(Clone, Default)]
pub struct InMemoryAccountRegistry {
    konten: Arc<DashMap<AccountId, Konto>>,
}

impl InMemoryAccountRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn konto_setzen(&self, konto: Konto) {
        self.konten.insert(konto.account_id, konto);
    }

    /// Aendert ein bestehendes Konto mit einer Closure
    pub fn konto_aktualisieren<F>(&self, account_id: AccountId, f: F) -> bool
    where
        F: FnOnce(&mut Konto),
    {
        if let Some(mut konto) = self.konten.get_mut(&account_id) {
            f(&mut konto);
            true
        } else {
            false
        }
    }
}

impl AccountRegistry for InMemoryAccountRegistry {
    fn konto(&self, account_id: AccountId) -> Result<Option<Konto>> {
        Ok(self.konten.get(&account_id).map(|k| k.clone()))
    }
}
