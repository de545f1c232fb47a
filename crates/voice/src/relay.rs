//! Gemeinsamer Kontext beider Voice-Kanaele
//!
//! Buendelt die Kollaborateure (Sitzungs- und Kontoregister), die
//! Prioritaets-Einstellungen und die Reichweite. Anmeldung, Mischen und
//! Prioritaets-Aenderungen laufen fuer Stream und Datagramm identisch.

use std::sync::Arc;

use proxima_core::{AccountId, AccountRegistry, Position, SessionRegistry};
use proxima_protocol::PrioritaetsBefehl;

use crate::error::{VoiceFehler, VoiceResult};
use crate::mixer::{konto_oder_leer, zuhoerer_ermitteln, MischKonstanten, Sprecher, Zuhoerer};
use crate::settings::PrioritySettingsRegistry;

/// Standard-Reichweite in Welt-Einheiten
pub const STANDARD_REICHWEITE: f32 = 15.0;

/// Geteilter Zustand der Voice-Kanaele
pub struct VoiceKontext {
    sitzungen: Arc<dyn SessionRegistry>,
    konten: Arc<dyn AccountRegistry>,
    prioritaet: PrioritySettingsRegistry,
    reichweite: f32,
}

impl VoiceKontext {
    pub fn neu(
        sitzungen: Arc<dyn SessionRegistry>,
        konten: Arc<dyn AccountRegistry>,
        prioritaet: PrioritySettingsRegistry,
        reichweite: f32,
    ) -> Self {
        Self {
            sitzungen,
            konten,
            prioritaet,
            reichweite,
        }
    }

    /// Prueft Spieler-ID und Voice-Kennung
    ///
    /// Die Kennung muss zum Konto passen und der Spieler muss verbunden und
    /// in eine Welt geladen sein.
    pub fn anmelden(&self, player_id: &str, voice_id: &str) -> VoiceResult<AccountId> {
        let account_id: AccountId = player_id
            .parse()
            .map_err(|_| VoiceFehler::UngueltigeSpielerId(player_id.to_string()))?;

        let konto = self
            .konten
            .konto(account_id)?
            .ok_or(VoiceFehler::KontoUnbekannt(account_id))?;
        if konto.voice_kennung.is_empty() || konto.voice_kennung != voice_id {
            return Err(VoiceFehler::KennungFalsch(account_id));
        }

        if self.position(account_id).is_none() {
            return Err(VoiceFehler::NichtInWelt(account_id));
        }
        Ok(account_id)
    }

    /// Autoritative Position eines aktiven Spielers
    pub fn position(&self, account_id: AccountId) -> Option<Position> {
        self.sitzungen
            .sitzung(account_id)
            .filter(|s| s.ist_aktiv_in_welt())
            .and_then(|s| s.position)
    }

    /// Ermittelt die Zuhoerer eines Sprechers
    ///
    /// `None` wenn der Sprecher in keiner Welt aktiv ist.
    pub fn mischen(
        &self,
        sprecher_id: AccountId,
        basis_lautstaerke: f32,
        konstanten: MischKonstanten,
    ) -> Option<Vec<Zuhoerer>> {
        let position = self.position(sprecher_id)?;
        let konto = konto_oder_leer(self.konten.as_ref(), sprecher_id);
        let settings = self.prioritaet.schnappschuss(position.welt);
        let sitzungen = self.sitzungen.sitzungen();

        let sprecher = Sprecher {
            konto: &konto,
            position,
            basis_lautstaerke,
        };
        Some(zuhoerer_ermitteln(
            &sprecher,
            &sitzungen,
            self.konten.as_ref(),
            &settings,
            self.reichweite,
            konstanten,
        ))
    }

    /// Aendert die Prioritaets-Einstellungen der Welt des Aufrufers
    pub fn prioritaet_aendern(
        &self,
        aufrufer: AccountId,
        typ: &str,
        wert: &str,
    ) -> VoiceResult<PrioritaetsBefehl> {
        let welt = self
            .position(aufrufer)
            .ok_or(VoiceFehler::NichtInWelt(aufrufer))?
            .welt;
        let befehl = PrioritaetsBefehl::parsen(typ, wert)?;

        let mut max = 0;
        let ok = self.prioritaet.mit_welt(welt, |s| {
            max = s.max_manuell;
            s.anwenden(befehl)
        });
        if !ok {
            return Err(VoiceFehler::ManuellVoll(max));
        }

        tracing::info!(account = %aufrufer, welt = %welt, ?befehl, "Prioritaets-Einstellung geaendert");
        Ok(befehl)
    }

    pub fn sitzungen(&self) -> &Arc<dyn SessionRegistry> {
        &self.sitzungen
    }

    pub fn prioritaet(&self) -> &PrioritySettingsRegistry {
        &self.prioritaet
    }

    pub fn reichweite(&self) -> f32 {
        self.reichweite
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
