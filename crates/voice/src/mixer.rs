//! Naehe-Mischer – wer hoert einen Sprecher, und wie laut?
//!
//! Gemeinsame Logik beider Voice-Kanaele. Die Kanaele unterscheiden sich nur
//! in ihren Untergrenzen ([`MischKonstanten`]).
//!
//! ```text
//! faktor      = max(distanz_faktor_min, 1 - distanz / reichweite)
//! lautstaerke = max(lautstaerke_min, basis * faktor)
//!             * multiplikator   (nur wenn das Prioritaets-System greift)
//! ```

use proxima_core::{AccountId, AccountRegistry, Konto, Position, SessionInfo};

use crate::settings::VoicePrioritySettings;

/// Untergrenzen eines Kanals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MischKonstanten {
    pub distanz_faktor_min: f32,
    pub lautstaerke_min: f32,
}

impl MischKonstanten {
    /// Stream-Kanal (TCP)
    pub const STREAM: Self = Self {
        distanz_faktor_min: 0.1,
        lautstaerke_min: 0.1,
    };

    /// Datagramm-Kanal (UDP)
    pub const DATAGRAMM: Self = Self {
        distanz_faktor_min: 0.1,
        lautstaerke_min: 0.2,
    };

    /// Streng fallend mit der Distanz bis zur Untergrenze
    pub fn distanz_faktor(&self, distanz: f32, reichweite: f32) -> f32 {
        (1.0 - distanz / reichweite).max(self.distanz_faktor_min)
    }

    /// Lautstaerke vor Anwendung der Prioritaet
    pub fn lautstaerke(&self, basis: f32, distanz: f32, reichweite: f32) -> f32 {
        (basis * self.distanz_faktor(distanz, reichweite)).max(self.lautstaerke_min)
    }
}

/// Ein Empfaenger der Audio-Daten
#[derive(Debug, Clone, PartialEq)]
pub struct Zuhoerer {
    pub account_id: AccountId,
    pub distanz: f32,
    /// Endgueltige Lautstaerke
    pub lautstaerke: f32,
    pub prioritaet: bool,
}

/// Sprecher einer Audio-Nachricht
#[derive(Debug, Clone)]
pub struct Sprecher<'a> {
    pub konto: &'a Konto,
    /// Autoritative Position aus dem Sitzungsregister
    pub position: Position,
    pub basis_lautstaerke: f32,
}

/// Ermittelt alle Zuhoerer eines Sprechers
///
/// Kandidaten sind verbundene Sitzungen in derselben Welt innerhalb der
/// Reichweite (ohne den Sprecher). Ihre Anzahl entscheidet, ob das
/// Prioritaets-System greift. Danach fallen alle Paare heraus, bei denen
/// eine Seite die andere ignoriert.
pub fn zuhoerer_ermitteln(
    sprecher: &Sprecher<'_>,
    sitzungen: &[SessionInfo],
    konten: &dyn AccountRegistry,
    settings: &VoicePrioritySettings,
    reichweite: f32,
    konstanten: MischKonstanten,
) -> Vec<Zuhoerer> {
    let sprecher_id = sprecher.konto.account_id;

    let kandidaten: Vec<(AccountId, f32)> = sitzungen
        .iter()
        .filter(|s| s.verbunden && s.account_id != sprecher_id)
        .filter_map(|s| {
            let pos = s.position?;
            if !pos.gleiche_welt(&sprecher.position) {
                return None;
            }
            let distanz = sprecher.position.distanz(&pos);
            (distanz <= reichweite).then_some((s.account_id, distanz))
        })
        .collect();

    let prioritaet_aktiv = settings.soll_aktivieren(kandidaten.len());

    kandidaten
        .into_iter()
        .filter_map(|(account_id, distanz)| {
            let konto = konto_oder_leer(konten, account_id);
            if sprecher.konto.ignoriert(account_id) || konto.ignoriert(sprecher_id) {
                tracing::trace!(
                    sprecher = %sprecher_id,
                    zuhoerer = %account_id,
                    "Voice blockiert (ignoriert)"
                );
                return None;
            }

            let mut lautstaerke = konstanten.lautstaerke(sprecher.basis_lautstaerke, distanz, reichweite);
            let prioritaet = prioritaet_aktiv && settings.hat_prioritaet(sprecher.konto, &konto);
            if prioritaet_aktiv {
                lautstaerke *= settings.lautstaerke_multiplikator(prioritaet);
            }

            Some(Zuhoerer {
                account_id,
                distanz,
                lautstaerke,
                prioritaet,
            })
        })
        .collect()
}

/// Laedt ein Konto; fehlende oder nicht ladbare Konten gelten als leer
pub fn konto_oder_leer(konten: &dyn AccountRegistry, account_id: AccountId) -> Konto {
    match konten.konto(account_id) {
        Ok(Some(konto)) => konto,
        Ok(None) => Konto {
            account_id,
            ..Default::default()
        },
        Err(e) => {
            tracing::warn!(account = %account_id, fehler = %e, "Konto nicht ladbar");
            Konto {
                account_id,
                ..Default::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
