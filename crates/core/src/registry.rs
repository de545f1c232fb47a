//! Kollaborateur-Schnittstellen
//!
//! Das Voice-Relay liest Sitzungen, Positionen und Konten ausschliesslich
//! ueber diese Traits. Die Spiellogik (Welt-Simulation, Persistenz) liegt
//! ausserhalb dieses Repositories und implementiert sie.

use std::collections::HashSet;

use crate::error::Result;
use crate::types::{AccountId, Position};

// ---------------------------------------------------------------------------
// Sitzungen
// ---------------------------------------------------------------------------

/// Schnappschuss einer aktiven Spiel-Sitzung
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Konto-ID des Spielers
    pub account_id: AccountId,
    /// Spieler-ID (Textform, wie sie der Client im Voice-Protokoll sendet)
    pub player_id: String,
    /// Ist der Spiel-Socket noch verbunden?
    pub verbunden: bool,
    /// Position, falls der Spieler in eine Welt geladen ist
    pub position: Option<Position>,
}

impl SessionInfo {
    /// Aktiv im Sinne des Voice-Relays: verbunden und in einer Welt geladen
    pub fn ist_aktiv_in_welt(&self) -> bool {
        self.verbunden && self.position.is_some()
    }
}

/// Sitzungs- und Positionsregister des Spielservers (nur lesend, plus Zustellung)
pub trait SessionRegistry: Send + Sync + 'static {
    /// Alle aktiven Sitzungen (Schnappschuss)
    fn sitzungen(&self) -> Vec<SessionInfo>;

    /// Sitzung eines bestimmten Kontos
    fn sitzung(&self, account_id: AccountId) -> Option<SessionInfo> {
        self.sitzungen()
            .into_iter()
            .find(|s| s.account_id == account_id)
    }

    /// Stellt eine "Voice-Audio angekommen"-Nachricht ueber die Spielverbindung zu
    ///
    /// Gibt `false` zurueck wenn der Empfaenger keine zustellbare Verbindung hat.
    fn proximity_voice_zustellen(&self, empfaenger: AccountId, json: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Konten
// ---------------------------------------------------------------------------

/// Kontodaten, soweit das Voice-Relay sie benoetigt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Konto {
    pub account_id: AccountId,
    /// Konten, die dieser Spieler ignoriert
    pub ignore_liste: HashSet<AccountId>,
    /// Gilden-ID (0 = keine Gilde)
    pub gilden_id: i32,
    /// Konten, die dieser Spieler "gelockt" (favorisiert) hat
    pub lock_liste: HashSet<AccountId>,
    /// Geheime Voice-Kennung fuer die Authentifizierung
    pub voice_kennung: String,
}

impl Konto {
    pub fn neu(account_id: AccountId, voice_kennung: impl Into<String>) -> Self {
        Self {
            account_id,
            voice_kennung: voice_kennung.into(),
            ..Default::default()
        }
    }

    pub fn ignoriert(&self, anderer: AccountId) -> bool {
        self.ignore_liste.contains(&anderer)
    }
}

/// Kontoregister (Persistenz liegt ausserhalb)
pub trait AccountRegistry: Send + Sync + 'static {
    /// Laedt ein Konto; `Ok(None)` wenn es nicht existiert
    fn konto(&self, account_id: AccountId) -> Result<Option<Konto>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorldId;

    #[test]
    fn aktiv_in_welt_braucht_verbindung_und_position() {
        let mut info = SessionInfo {
            account_id: AccountId(1),
            player_id: "1".into(),
            verbunden: true,
            position: None,
        };
        assert!(!info.ist_aktiv_in_welt());

        info.position = Some(Position::neu(1.0, 1.0, WorldId(3)));
        assert!(info.ist_aktiv_in_welt());

        info.verbunden = false;
        assert!(!info.ist_aktiv_in_welt());
    }

    #[test]
    fn konto_ignoriert() {
        let mut konto = Konto::neu(AccountId(1), "geheim");
        konto.ignore_liste.insert(AccountId(2));
        assert!(konto.ignoriert(AccountId(2)));
        assert!(!konto.ignoriert(AccountId(3)));
    }
}
