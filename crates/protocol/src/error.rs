//! Fehlertypen fuer das Protokoll-Crate

use std::io;
use thiserror::Error;

/// Alle Dekodier- und Kodierfehler der Proxima-Protokolle
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// IO-Fehler beim Lesen/Schreiben (Codec)
    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),

    /// Deklarierte Frame-Laenge ausserhalb der erlaubten Grenzen
    #[error("Ungueltige Frame-Laenge: {laenge} Bytes (erlaubt {min}..={max})")]
    FrameLaenge { laenge: usize, min: usize, max: usize },

    /// Nachricht passt nicht in den Sendepuffer
    #[error("Nachricht zu gross: {laenge} Bytes (Maximum: {max} Bytes)")]
    NachrichtZuGross { laenge: usize, max: usize },

    /// Zeichenkette laenger als das u16-Laengenfeld erlaubt
    #[error("Zeichenkette zu lang: {0} Bytes")]
    ZeichenketteZuLang(usize),

    /// Paket kuerzer als das Minimum fuer seinen Typ
    #[error("Paket zu kurz: {laenge} Bytes (erwartet mindestens {erwartet})")]
    ZuKurz { laenge: usize, erwartet: usize },

    /// Unbekannter Befehl im Voice-Stream
    #[error("Unbekannter Befehl: {0:?}")]
    UnbekannterBefehl(String),

    /// VOICE_CONNECT ohne Voice-Kennung
    #[error("Unvollstaendige Anmeldung: {0:?}")]
    UnvollstaendigeAnmeldung(String),

    /// Ungueltiges Befehlsformat
    #[error("Ungueltiges Befehlsformat: {0}")]
    Format(String),

    /// Unbekannter Einstellungstyp
    #[error("Unbekannte Prioritaets-Einstellung: {0:?}")]
    UnbekannteEinstellung(String),

    /// Wert nicht parsebar
    #[error("Ungueltiger Wert fuer {typ}: {wert:?}")]
    UngueltigerWert { typ: &'static str, wert: String },

    /// JSON-Nutzdaten nicht lesbar
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtokollFehler {
    /// Verletzt der Fehler die Framing-Regeln (Verbindung muss getrennt werden)?
    pub fn ist_framing_verletzung(&self) -> bool {
        matches!(self, Self::FrameLaenge { .. } | Self::Io(_))
    }
}

/// Result-Alias fuer das Protokoll-Crate
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
