//! Fehlertypen fuer Proxima
//!
//! Zentraler Fehler-Enum fuer alles, was die Kollaborateur-Schnittstellen
//! und die gemeinsam genutzten Typen liefern koennen. Untercrates definieren
//! eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Proxima
pub type Result<T> = std::result::Result<T, ProximaError>;

/// Alle gemeinsamen Fehler im Proxima-System
#[derive(Debug, Error)]
pub enum ProximaError {
    // --- Identitaet ---
    #[error("Ungueltige Spieler-ID: {0:?}")]
    UngueltigeSpielerId(String),

    // --- Kollaborateure ---
    #[error("Kontoregister nicht erreichbar: {0}")]
    KontoRegister(String),

    #[error("Sitzungsregister nicht erreichbar: {0}")]
    SitzungsRegister(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ProximaError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn ein Kollaborateur nur voruebergehend ausgefallen ist
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(self, Self::KontoRegister(_) | Self::SitzungsRegister(_))
    }
}
