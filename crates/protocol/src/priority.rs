//! Prioritaets-Befehle (`PRIORITY_SETTING` / `PRIO`)
//!
//! Beide Voice-Kanaele liefern Einstellungstyp und Wert als Text. Dieses Modul
//! uebersetzt das Paar in einen typisierten Befehl; die Anwendung auf die
//! Welt-Einstellungen passiert in `proxima-voice`.

use proxima_core::AccountId;

use crate::error::{ProtokollFehler, ProtokollResult};

/// Typisierte Aenderung an den Prioritaets-Einstellungen einer Welt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrioritaetsBefehl {
    /// `ENABLED`
    Aktiviert(bool),
    /// `THRESHOLD`
    Schwelle(i32),
    /// `PRIORITY_VOLUME`
    PrioritaetsLautstaerke(f32),
    /// `NON_PRIORITY_VOLUME`
    NichtPrioritaetsLautstaerke(f32),
    /// `GUILD_PRIORITY`
    GildenPrioritaet(bool),
    /// `LOCK_PRIORITY`
    LockPrioritaet(bool),
    /// `MAX_MANUAL`
    MaxManuell(i32),
    /// `ADD_MANUAL`
    ManuellHinzufuegen(AccountId),
    /// `REMOVE_MANUAL`
    ManuellEntfernen(AccountId),
}

impl PrioritaetsBefehl {
    /// Parst Einstellungstyp und Wert
    ///
    /// Der Typ wird ohne Beachtung der Gross-/Kleinschreibung verglichen.
    pub fn parsen(typ: &str, wert: &str) -> ProtokollResult<Self> {
        let wert = wert.trim();
        let befehl = match typ.trim().to_ascii_uppercase().as_str() {
            "ENABLED" => Self::Aktiviert(bool_parsen(wert)?),
            "THRESHOLD" => Self::Schwelle(ganzzahl_parsen(wert)?),
            "PRIORITY_VOLUME" => Self::PrioritaetsLautstaerke(float_parsen(wert)?),
            "NON_PRIORITY_VOLUME" => Self::NichtPrioritaetsLautstaerke(float_parsen(wert)?),
            "GUILD_PRIORITY" => Self::GildenPrioritaet(bool_parsen(wert)?),
            "LOCK_PRIORITY" => Self::LockPrioritaet(bool_parsen(wert)?),
            "MAX_MANUAL" => Self::MaxManuell(ganzzahl_parsen(wert)?),
            "ADD_MANUAL" => Self::ManuellHinzufuegen(konto_parsen(wert)?),
            "REMOVE_MANUAL" => Self::ManuellEntfernen(konto_parsen(wert)?),
            _ => return Err(ProtokollFehler::UnbekannteEinstellung(typ.to_string())),
        };
        Ok(befehl)
    }
}

fn bool_parsen(wert: &str) -> ProtokollResult<bool> {
    if wert.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if wert.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ungueltig("bool", wert))
    }
}

fn ganzzahl_parsen(wert: &str) -> ProtokollResult<i32> {
    wert.parse::<i32>().map_err(|_| ungueltig("int", wert))
}

fn float_parsen(wert: &str) -> ProtokollResult<f32> {
    match wert.parse::<f32>() {
        Ok(f) if f.is_finite() => Ok(f),
        _ => Err(ungueltig("float", wert)),
    }
}

fn konto_parsen(wert: &str) -> ProtokollResult<AccountId> {
    wert.parse::<AccountId>().map_err(|_| ungueltig("account", wert))
}

fn ungueltig(typ: &'static str, wert: &str) -> ProtokollFehler {
    ProtokollFehler::UngueltigerWert {
        typ,
        wert: wert.to_string(),
    }
}
