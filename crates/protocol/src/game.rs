//! Spielprotokoll – 5-Byte-Header, laengenpraefixierte Frames
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+----...----+
//! | Gesamtlaenge (u32 LE, inkl. Header)  | Typ    | Body      |
//! +--------+--------+--------+--------+--------+----...----+
//! ```
//!
//! Der Inhalt der Bodies gehoert der Spiellogik. Dieses Modul kennt nur den
//! Umschlag sowie die wenigen Nachrichten, die der Netzwerkrand selbst
//! versendet ([`SpielNachricht`]).

use bytes::BufMut;

use crate::error::{ProtokollFehler, ProtokollResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesse des Frame-Headers (Laenge + Typ)
pub const KOPF_GROESSE: usize = 5;

/// Standard-Segmentgroesse pro Verbindung und Richtung
pub const STANDARD_PUFFER_GROESSE: usize = u16::MAX as usize * 3;

/// Nachrichten-IDs, die der Netzwerkrand selbst verwendet
pub struct NachrichtId;

impl NachrichtId {
    /// Fehlermeldung an den Client
    pub const FAILURE: u8 = 0x00;
    /// Proximity-Voice-Audio (JSON als String)
    pub const PROXIMITY_VOICE: u8 = 0xF0;
}

// ---------------------------------------------------------------------------
// FrameKopf
// ---------------------------------------------------------------------------

/// Gelesener Frame-Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameKopf {
    /// Deklarierte Gesamtlaenge inkl. Header
    pub laenge: usize,
    /// Nachrichtentyp
    pub nachricht_id: u8,
}

impl FrameKopf {
    /// Liest den Header aus den ersten 5 Bytes; `None` wenn noch zu wenig Daten
    pub fn lesen(buf: &[u8]) -> Option<Self> {
        if buf.len() < KOPF_GROESSE {
            return None;
        }
        let laenge = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        Some(Self {
            laenge,
            nachricht_id: buf[4],
        })
    }

    /// Prueft die Laenge gegen Header-Groesse und Pufferkapazitaet
    pub fn validieren(&self, kapazitaet: usize) -> ProtokollResult<()> {
        if self.laenge < KOPF_GROESSE || self.laenge > kapazitaet {
            return Err(ProtokollFehler::FrameLaenge {
                laenge: self.laenge,
                min: KOPF_GROESSE,
                max: kapazitaet,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpielNachricht
// ---------------------------------------------------------------------------

/// Ausgehende Nachrichten des Netzwerkrands (geschlossene Menge)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpielNachricht {
    /// Fehler mit Code und Text
    Fehler { code: i32, text: String },
    /// Proximity-Voice-Audio als JSON-Dokument
    ProximityVoice { json: String },
}

impl SpielNachricht {
    /// Nachrichten-ID im Header
    pub fn nachricht_id(&self) -> u8 {
        match self {
            Self::Fehler { .. } => NachrichtId::FAILURE,
            Self::ProximityVoice { .. } => NachrichtId::PROXIMITY_VOICE,
        }
    }

    /// Gesamtlaenge des Frames inkl. Header
    pub fn frame_laenge(&self) -> usize {
        KOPF_GROESSE
            + match self {
                Self::Fehler { text, .. } => 4 + utf_laenge(text),
                Self::ProximityVoice { json } => utf_laenge(json),
            }
    }

    /// Schreibt den vollstaendigen Frame an den Anfang von `ziel`
    ///
    /// Gibt die Anzahl geschriebener Bytes zurueck. Es wird nichts alloziert;
    /// `ziel` ist typischerweise das Sende-Segment einer Verbindung.
    pub fn schreiben(&self, ziel: &mut [u8]) -> ProtokollResult<usize> {
        let laenge = self.frame_laenge();
        if laenge > ziel.len() {
            return Err(ProtokollFehler::NachrichtZuGross {
                laenge,
                max: ziel.len(),
            });
        }

        let mut w = &mut ziel[..laenge];
        w.put_u32_le(laenge as u32);
        w.put_u8(self.nachricht_id());
        match self {
            Self::Fehler { code, text } => {
                w.put_i32(*code);
                utf_schreiben(&mut w, text)?;
            }
            Self::ProximityVoice { json } => {
                utf_schreiben(&mut w, json)?;
            }
        }
        Ok(laenge)
    }

    /// Kodiert den Frame in einen neuen Vec (Tests, Diagnose)
    pub fn kodieren(&self) -> ProtokollResult<Vec<u8>> {
        let mut buf = vec![0u8; self.frame_laenge()];
        self.schreiben(&mut buf)?;
        Ok(buf)
    }
}

/// Laenge eines Strings im Spielprotokoll (u16-Laengenfeld + UTF-8)
fn utf_laenge(s: &str) -> usize {
    2 + s.len()
}

/// Schreibt einen String als u16 big-endian Bytelaenge + UTF-8
fn utf_schreiben(w: &mut &mut [u8], s: &str) -> ProtokollResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| ProtokollFehler::ZeichenketteZuLang(s.len()))?;
    w.put_u16(len);
    w.put_slice(s.as_bytes());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
