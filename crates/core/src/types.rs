//! Gemeinsame Identifikationstypen fuer Proxima
//!
//! Konten und Welten werden vom Spielserver mit Ganzzahlen identifiziert.
//! Auf dem Draht erscheint eine Spieler-ID als Dezimaltext der Konto-ID;
//! das Newtype-Pattern schliesst Verwechslungen zur Compilezeit aus.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ProximaError;

/// Konto-ID eines Spielers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i32);

impl AccountId {
    /// Gibt die innere Ganzzahl zurueck
    pub fn inner(&self) -> i32 {
        self.0
    }

    /// Textform, wie sie im Voice-Protokoll als Spieler-ID erscheint
    pub fn als_spieler_id(&self) -> String {
        self.0.to_string()
    }
}

impl FromStr for AccountId {
    type Err = ProximaError;

    /// Parst eine Spieler-ID (Dezimaltext, umgebende Leerzeichen erlaubt)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(Self)
            .map_err(|_| ProximaError::UngueltigeSpielerId(s.to_string()))
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "account:{}", self.0)
    }
}

/// Welt-ID (Instanz einer Spielwelt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub i32);

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "world:{}", self.0)
    }
}

/// Autoritative Position eines Spielers in einer geladenen Welt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub welt: WorldId,
}

impl Position {
    pub fn neu(x: f32, y: f32, welt: WorldId) -> Self {
        Self { x, y, welt }
    }

    /// Euklidischer Abstand in Welt-Einheiten (Welt wird nicht beruecksichtigt)
    pub fn distanz(&self, andere: &Position) -> f32 {
        let dx = self.x - andere.x;
        let dy = self.y - andere.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn gleiche_welt(&self, andere: &Position) -> bool {
        self.welt == andere.welt
    }
}
