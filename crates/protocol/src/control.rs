//! Befehle des Voice-Streams
//!
//! Jede Stream-Nachricht ist ein Text mit Befehlspraefix:
//!
//! ```text
//! VOICE_CONNECT:<playerId>:<voiceId>
//! VOICE_DATA:<json>
//! PRIORITY_SETTING:<typ>:<wert>
//! ```
//!
//! JSON-Felder verwenden PascalCase, wie es die bestehenden Clients senden.
//! Audio-Bytes werden in JSON base64-kodiert uebertragen.

use serde::{Deserialize, Serialize};

use crate::error::{ProtokollFehler, ProtokollResult};

/// Praefix fuer die Anmeldung
pub const PRAEFIX_VERBINDEN: &str = "VOICE_CONNECT:";
/// Praefix fuer Audio-Daten
pub const PRAEFIX_DATEN: &str = "VOICE_DATA:";
/// Praefix fuer Prioritaets-Einstellungen
pub const PRAEFIX_PRIORITAET: &str = "PRIORITY_SETTING:";

/// Pakettyp-Kennung ausgehender Audio-Nachrichten
pub const PAKETTYP_PROXIMITY_VOICE: &str = "PROXIMITY_VOICE";

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Audio-Daten eines Sprechers (`VOICE_DATA:`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceDaten {
    /// Spieler-ID des Sprechers
    pub player_id: String,
    /// Anzeigename
    #[serde(default)]
    pub player_name: String,
    /// Rohe Audio-Nutzdaten (base64 in JSON)
    #[serde(with = "base64_serde", default)]
    pub audio_data: Vec<u8>,
    /// Basis-Lautstaerke des Sprechers
    #[serde(default = "standard_lautstaerke")]
    pub volume: f32,
    /// Vom Client gemeldete Koordinaten (fuer das Routing unbenutzt)
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

fn standard_lautstaerke() -> f32 {
    1.0
}

/// Geparster Stream-Befehl
#[derive(Debug, Clone, PartialEq)]
pub enum StreamBefehl {
    /// Anmeldung mit Spieler-ID und Voice-Kennung
    Verbinden { player_id: String, voice_id: String },
    /// Audio eines Sprechers
    Daten(VoiceDaten),
    /// Aenderung der Prioritaets-Einstellungen der eigenen Welt
    Prioritaet { typ: String, wert: String },
}

impl StreamBefehl {
    /// Parst eine Stream-Nachricht
    ///
    /// # Fehler
    /// - `UnvollstaendigeAnmeldung` wenn `VOICE_CONNECT` keine Voice-Kennung enthaelt
    /// - `Json` bei ungueltigem `VOICE_DATA`-Dokument
    /// - `Format` bei `PRIORITY_SETTING` ohne Wert
    /// - `UnbekannterBefehl` fuer alles andere
    pub fn parsen(text: &str) -> ProtokollResult<Self> {
        if let Some(rest) = text.strip_prefix(PRAEFIX_VERBINDEN) {
            let mut teile = rest.split(':');
            let player_id = teile.next().unwrap_or_default().trim();
            let voice_id = teile.next().map(str::trim).unwrap_or_default();
            if player_id.is_empty() || voice_id.is_empty() {
                return Err(ProtokollFehler::UnvollstaendigeAnmeldung(rest.to_string()));
            }
            return Ok(Self::Verbinden {
                player_id: player_id.to_string(),
                voice_id: voice_id.to_string(),
            });
        }

        if let Some(json) = text.strip_prefix(PRAEFIX_DATEN) {
            let daten: VoiceDaten = serde_json::from_str(json)?;
            return Ok(Self::Daten(daten));
        }

        if let Some(rest) = text.strip_prefix(PRAEFIX_PRIORITAET) {
            let (typ, wert) = rest
                .split_once(':')
                .ok_or_else(|| ProtokollFehler::Format(format!("Wert fehlt: {rest:?}")))?;
            return Ok(Self::Prioritaet {
                typ: typ.trim().to_string(),
                wert: wert.trim().to_string(),
            });
        }

        // Nur einen kurzen Ausschnitt ins Log/den Fehler uebernehmen
        let ausschnitt: String = text.chars().take(20).collect();
        Err(ProtokollFehler::UnbekannterBefehl(ausschnitt))
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Audio-Nachricht an einen Zuhoerer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProximityVoiceNachricht {
    /// Immer `PROXIMITY_VOICE`
    pub packet_type: String,
    /// Spieler-ID des Sprechers
    pub player_id: String,
    pub player_name: String,
    /// Audio-Nutzdaten (base64)
    #[serde(with = "base64_serde")]
    pub audio_data: Vec<u8>,
    /// Endgueltige Lautstaerke fuer diesen Zuhoerer
    pub volume: f32,
    /// Abstand Sprecher–Zuhoerer in Welt-Einheiten
    pub distance: f32,
    /// Zeitstempel (Unix-Millisekunden)
    pub timestamp: i64,
}

impl ProximityVoiceNachricht {
    pub fn neu(
        daten: &VoiceDaten,
        volume: f32,
        distance: f32,
        timestamp: i64,
    ) -> Self {
        Self {
            packet_type: PAKETTYP_PROXIMITY_VOICE.to_string(),
            player_id: daten.player_id.clone(),
            player_name: daten.player_name.clone(),
            audio_data: daten.audio_data.clone(),
            volume,
            distance,
            timestamp,
        }
    }

    /// Serialisiert die Nachricht als JSON-Text
    pub fn zu_json(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// base64 fuer Vec<u8>
// ---------------------------------------------------------------------------

mod base64_serde {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
