//! Prioritaets-Einstellungen pro Welt
//!
//! Reines Policy-Objekt ohne I/O. Wird die Schwelle an Spielern in Hoerweite
//! erreicht, hoeren Zuhoerer priorisierte Sprecher mit `prioritaets_lautstaerke`
//! und alle anderen mit `nicht_prioritaets_lautstaerke`.

use std::sync::Arc;

use dashmap::DashMap;
use proxima_core::{AccountId, Konto, WorldId};
use proxima_protocol::PrioritaetsBefehl;
use serde::{Deserialize, Serialize};

/// Untere Grenze fuer die Groesse der manuellen Liste
pub const MAX_MANUELL_UNTERGRENZE: usize = 5;
/// Obere Grenze fuer die Groesse der manuellen Liste
pub const MAX_MANUELL_OBERGRENZE: usize = 50;

// ---------------------------------------------------------------------------
// VoicePrioritySettings
// ---------------------------------------------------------------------------

/// Prioritaets-Policy einer Welt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePrioritySettings {
    pub aktiviert: bool,
    /// Ab dieser Anzahl Spieler in Hoerweite greift die Policy
    pub schwelle: i32,
    /// Erlaubt 0.0..=2.0
    pub prioritaets_lautstaerke: f32,
    /// Erlaubt 0.0..=1.0
    pub nicht_prioritaets_lautstaerke: f32,
    pub gilden_prioritaet: bool,
    pub lock_prioritaet: bool,
    /// Erlaubt 5..=50
    pub max_manuell: usize,
    /// Manuell priorisierte Konten, aelteste zuerst
    #[serde(skip)]
    pub(crate) manuell: Vec<AccountId>,
}

impl Default for VoicePrioritySettings {
    fn default() -> Self {
        Self {
            aktiviert: false,
            schwelle: 8,
            prioritaets_lautstaerke: 1.0,
            nicht_prioritaets_lautstaerke: 0.2,
            gilden_prioritaet: true,
            lock_prioritaet: true,
            max_manuell: 10,
            manuell: Vec::new(),
        }
    }
}

impl VoicePrioritySettings {
    /// Greift die Policy bei `anzahl` Spielern in Hoerweite?
    pub fn soll_aktivieren(&self, anzahl: usize) -> bool {
        self.aktiviert && anzahl >= self.schwelle.max(0) as usize
    }

    /// Hat `sprecher` fuer `zuhoerer` Prioritaet?
    ///
    /// Die Lock-Liste ist asymmetrisch: die Liste des Zuhoerers entscheidet.
    pub fn hat_prioritaet(&self, sprecher: &Konto, zuhoerer: &Konto) -> bool {
        if self.manuell.contains(&sprecher.account_id) {
            return true;
        }
        if self.gilden_prioritaet && sprecher.gilden_id != 0 && sprecher.gilden_id == zuhoerer.gilden_id {
            return true;
        }
        self.lock_prioritaet && zuhoerer.lock_liste.contains(&sprecher.account_id)
    }

    pub fn lautstaerke_multiplikator(&self, prioritaet: bool) -> f32 {
        if prioritaet {
            self.prioritaets_lautstaerke
        } else {
            self.nicht_prioritaets_lautstaerke
        }
    }

    /// Fuegt ein Konto der manuellen Liste hinzu
    ///
    /// `false` wenn die Liste voll ist. Ein bereits enthaltenes Konto gilt
    /// als Erfolg.
    pub fn manuell_hinzufuegen(&mut self, account: AccountId) -> bool {
        if self.manuell.contains(&account) {
            return true;
        }
        if self.ist_voll() {
            return false;
        }
        self.manuell.push(account);
        true
    }

    pub fn manuell_entfernen(&mut self, account: AccountId) -> bool {
        let vorher = self.manuell.len();
        self.manuell.retain(|a| *a != account);
        self.manuell.len() != vorher
    }

    pub fn manuell(&self) -> &[AccountId] {
        &self.manuell
    }

    pub fn ist_voll(&self) -> bool {
        self.manuell.len() >= self.max_manuell
    }

    pub fn freie_plaetze(&self) -> usize {
        self.max_manuell.saturating_sub(self.manuell.len())
    }

    /// Klemmt alle Werte in ihre Grenzen und kuerzt die manuelle Liste
    ///
    /// Beim Kuerzen fallen die aeltesten Eintraege heraus.
    pub fn validieren(&mut self) {
        self.max_manuell = self
            .max_manuell
            .clamp(MAX_MANUELL_UNTERGRENZE, MAX_MANUELL_OBERGRENZE);
        self.schwelle = self.schwelle.max(1);
        self.prioritaets_lautstaerke = klemmen(self.prioritaets_lautstaerke, 0.0, 2.0);
        self.nicht_prioritaets_lautstaerke = klemmen(self.nicht_prioritaets_lautstaerke, 0.0, 1.0);

        if self.manuell.len() > self.max_manuell {
            let ueberschuss = self.manuell.len() - self.max_manuell;
            self.manuell.drain(..ueberschuss);
        }
    }

    /// Wendet einen Befehl an und validiert danach
    ///
    /// `false` nur wenn `ManuellHinzufuegen` an der vollen Liste scheitert.
    pub fn anwenden(&mut self, befehl: PrioritaetsBefehl) -> bool {
        let ok = match befehl {
            PrioritaetsBefehl::Aktiviert(v) => {
                self.aktiviert = v;
                true
            }
            PrioritaetsBefehl::Schwelle(v) => {
                self.schwelle = v;
                true
            }
            PrioritaetsBefehl::PrioritaetsLautstaerke(v) => {
                self.prioritaets_lautstaerke = v;
                true
            }
            PrioritaetsBefehl::NichtPrioritaetsLautstaerke(v) => {
                self.nicht_prioritaets_lautstaerke = v;
                true
            }
            PrioritaetsBefehl::GildenPrioritaet(v) => {
                self.gilden_prioritaet = v;
                true
            }
            PrioritaetsBefehl::LockPrioritaet(v) => {
                self.lock_prioritaet = v;
                true
            }
            PrioritaetsBefehl::MaxManuell(v) => {
                self.max_manuell = v.max(0) as usize;
                true
            }
            PrioritaetsBefehl::ManuellHinzufuegen(a) => self.manuell_hinzufuegen(a),
            PrioritaetsBefehl::ManuellEntfernen(a) => {
                self.manuell_entfernen(a);
                true
            }
        };
        self.validieren();
        ok
    }
}

fn klemmen(wert: f32, min: f32, max: f32) -> f32 {
    if wert.is_nan() {
        return min;
    }
    wert.clamp(min, max)
}

// ---------------------------------------------------------------------------
// PrioritySettingsRegistry
// ---------------------------------------------------------------------------

/// Einstellungen aller Welten, lazy angelegt
///
/// Clone teilt den inneren Zustand (Arc).
#[derive(Debug, Clone, Default)]
pub struct PrioritySettingsRegistry {
    welten: Arc<DashMap<WorldId, VoicePrioritySettings>>,
    vorlage: VoicePrioritySettings,
}

impl PrioritySettingsRegistry {
    /// Neue Welten starten mit einer (validierten) Kopie von `vorlage`
    pub fn neu(mut vorlage: VoicePrioritySettings) -> Self {
        vorlage.validieren();
        Self {
            welten: Arc::new(DashMap::new()),
            vorlage,
        }
    }

    /// Veraendert die Einstellungen einer Welt; validiert danach
    pub fn mit_welt<R>(&self, welt: WorldId, f: impl FnOnce(&mut VoicePrioritySettings) -> R) -> R {
        let mut eintrag = self
            .welten
            .entry(welt)
            .or_insert_with(|| self.vorlage.clone());
        let ergebnis = f(&mut eintrag);
        eintrag.validieren();
        ergebnis
    }

    /// Kopie der aktuellen Einstellungen einer Welt
    pub fn schnappschuss(&self, welt: WorldId) -> VoicePrioritySettings {
        self.welten
            .get(&welt)
            .map(|s| s.value().clone())
            .unwrap_or_else(|| self.vorlage.clone())
    }

    pub fn anzahl_welten(&self) -> usize {
        self.welten.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn konto(id: i32, gilde: i32) -> Konto {
        Konto {
            gilden_id: gilde,
            ..Konto::neu(AccountId(id), "k")
        }
    }

    #[test]
    fn standardwerte() {
        let s = VoicePrioritySettings::default();
        assert!(!s.aktiviert);
        assert_eq!(s.schwelle, 8);
        assert_eq!(s.max_manuell, 10);
        assert_eq!(s.prioritaets_lautstaerke, 1.0);
        assert_eq!(s.nicht_prioritaets_lautstaerke, 0.2);
        assert!(s.gilden_prioritaet && s.lock_prioritaet);
    }

    #[test]
    fn aktivierung_braucht_flag_und_schwelle() {
        let mut s = VoicePrioritySettings::default();
        assert!(!s.soll_aktivieren(100));
        s.aktiviert = true;
        assert!(!s.soll_aktivieren(7));
        assert!(s.soll_aktivieren(8));
        assert!(s.soll_aktivieren(9));
    }

    #[test]
    fn manuelle_prioritaet_schlaegt_alles() {
        let mut s = VoicePrioritySettings {
            gilden_prioritaet: false,
            lock_prioritaet: false,
            ..Default::default()
        };
        let sprecher = konto(1, 0);
        let zuhoerer = konto(2, 0);
        assert!(!s.hat_prioritaet(&sprecher, &zuhoerer));

        assert!(s.manuell_hinzufuegen(AccountId(1)));
        assert!(s.hat_prioritaet(&sprecher, &zuhoerer));
    }

    #[test]
    fn gilden_prioritaet() {
        let s = VoicePrioritySettings::default();
        assert!(s.hat_prioritaet(&konto(1, 7), &konto(2, 7)));
        // Gilde 0 = keine Gilde
        assert!(!s.hat_prioritaet(&konto(1, 0), &konto(2, 0)));
        assert!(!s.hat_prioritaet(&konto(1, 7), &konto(2, 8)));

        let aus = VoicePrioritySettings {
            gilden_prioritaet: false,
            ..Default::default()
        };
        assert!(!aus.hat_prioritaet(&konto(1, 7), &konto(2, 7)));
    }

    #[test]
    fn lock_prioritaet_ist_asymmetrisch() {
        let s = VoicePrioritySettings::default();
        let sprecher = konto(1, 0);
        let mut zuhoerer = konto(2, 0);
        zuhoerer.lock_liste.insert(AccountId(1));

        assert!(s.hat_prioritaet(&sprecher, &zuhoerer));
        assert!(!s.hat_prioritaet(&zuhoerer, &sprecher));
    }

    #[test]
    fn multiplikator() {
        let s = VoicePrioritySettings::default();
        assert_eq!(s.lautstaerke_multiplikator(true), 1.0);
        assert_eq!(s.lautstaerke_multiplikator(false), 0.2);
    }

    #[test]
    fn manuelle_liste_begrenzt() {
        let mut s = VoicePrioritySettings {
            max_manuell: 5,
            ..Default::default()
        };
        for i in 0..5 {
            assert!(s.manuell_hinzufuegen(AccountId(i)));
        }
        assert!(s.ist_voll());
        assert_eq!(s.freie_plaetze(), 0);
        assert!(!s.manuell_hinzufuegen(AccountId(99)));
        // Bereits enthalten
        assert!(s.manuell_hinzufuegen(AccountId(3)));

        assert!(s.manuell_entfernen(AccountId(3)));
        assert!(!s.manuell_entfernen(AccountId(3)));
        assert_eq!(s.freie_plaetze(), 1);
    }

    #[test]
    fn validieren_klemmt_und_kuerzt() {
        let mut s = VoicePrioritySettings {
            max_manuell: 20,
            ..Default::default()
        };
        for i in 0..20 {
            s.manuell_hinzufuegen(AccountId(i));
        }

        s.max_manuell = 1;
        s.prioritaets_lautstaerke = 5.0;
        s.nicht_prioritaets_lautstaerke = -1.0;
        s.schwelle = 0;
        s.validieren();

        assert_eq!(s.max_manuell, 5);
        assert_eq!(s.prioritaets_lautstaerke, 2.0);
        assert_eq!(s.nicht_prioritaets_lautstaerke, 0.0);
        assert_eq!(s.schwelle, 1);
        // Aelteste Eintraege fallen heraus
        assert_eq!(s.manuell(), &[15, 16, 17, 18, 19].map(AccountId));

        s.max_manuell = 80;
        s.validieren();
        assert_eq!(s.max_manuell, 50);
    }

    #[test]
    fn befehle_anwenden() {
        let mut s = VoicePrioritySettings::default();
        assert!(s.anwenden(PrioritaetsBefehl::Aktiviert(true)));
        assert!(s.anwenden(PrioritaetsBefehl::Schwelle(3)));
        assert!(s.anwenden(PrioritaetsBefehl::NichtPrioritaetsLautstaerke(1.7)));
        assert!(s.anwenden(PrioritaetsBefehl::MaxManuell(-4)));
        assert!(s.anwenden(PrioritaetsBefehl::ManuellHinzufuegen(AccountId(5))));

        assert!(s.aktiviert);
        assert_eq!(s.schwelle, 3);
        assert_eq!(s.nicht_prioritaets_lautstaerke, 1.0);
        assert_eq!(s.max_manuell, 5);
        assert_eq!(s.manuell(), &[AccountId(5)]);

        for i in 10..14 {
            s.anwenden(PrioritaetsBefehl::ManuellHinzufuegen(AccountId(i)));
        }
        assert!(!s.anwenden(PrioritaetsBefehl::ManuellHinzufuegen(AccountId(20))));
        assert!(s.anwenden(PrioritaetsBefehl::ManuellEntfernen(AccountId(5))));
        assert_eq!(s.manuell().len(), 4);
    }

    #[test]
    fn registry_legt_welten_lazy_an() {
        let registry = PrioritySettingsRegistry::default();
        assert_eq!(registry.anzahl_welten(), 0);
        assert!(!registry.schnappschuss(WorldId(5)).aktiviert);
        assert_eq!(registry.anzahl_welten(), 0);

        registry.mit_welt(WorldId(5), |s| s.aktiviert = true);
        assert_eq!(registry.anzahl_welten(), 1);
        assert!(registry.schnappschuss(WorldId(5)).aktiviert);
        assert!(!registry.schnappschuss(WorldId(6)).aktiviert);
    }

    #[test]
    fn registry_validiert_nach_jeder_aenderung() {
        let registry = PrioritySettingsRegistry::default();
        registry.mit_welt(WorldId(1), |s| s.prioritaets_lautstaerke = 9.0);
        assert_eq!(registry.schnappschuss(WorldId(1)).prioritaets_lautstaerke, 2.0);
    }

    #[test]
    fn registry_clone_teilt_zustand() {
        let a = PrioritySettingsRegistry::neu(VoicePrioritySettings::default());
        let b = a.clone();
        a.mit_welt(WorldId(2), |s| s.schwelle = 4);
        assert_eq!(b.schnappschuss(WorldId(2)).schwelle, 4);
    }
}
