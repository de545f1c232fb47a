//! Voice-Protokoll (Datagramme)
//!
//! Jedes Datagramm beginnt mit einem 4-Byte-ASCII-Tag. Alles, was keinen
//! bekannten Tag traegt und mindestens 20 Bytes lang ist, sind Audio-Daten.
//!
//! ## Paketformate
//!
//! ```text
//! AUTH{"playerId":..,"voiceId":..}          Anmeldung
//! PRIO{"playerId":..,"settingType":..,"value":..}
//! PING                                      -> PONG
//!
//! Audio (Client -> Server):
//! Offset  Len  Beschreibung
//!  0      16   Sprecher-ID (ASCII, mit 0 aufgefuellt)
//! 16+      N   Audio-Nutzdaten
//!
//! Audio (Server -> Client):
//!  0      16   Sprecher-ID (ASCII, mit 0 aufgefuellt)
//! 16       4   Lautstaerke (f32 LE)
//! 20+      N   Audio-Nutzdaten
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ProtokollFehler, ProtokollResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Laenge des Tags am Paketanfang
pub const TAG_LAENGE: usize = 4;
/// Anmeldung
pub const TAG_AUTH: [u8; 4] = *b"AUTH";
/// Prioritaets-Einstellung
pub const TAG_PRIO: [u8; 4] = *b"PRIO";
/// Erreichbarkeitstest
pub const TAG_PING: [u8; 4] = *b"PING";
/// Antwort auf PING
pub const TAG_PONG: [u8; 4] = *b"PONG";

/// Feste Breite der Sprecher-ID in Audio-Paketen
pub const SPRECHER_ID_LAENGE: usize = 16;
/// Mindestlaenge eines Audio-Datagramms
pub const MIN_VOICE_LAENGE: usize = 20;

// ---------------------------------------------------------------------------
// Eingehende Pakete
// ---------------------------------------------------------------------------

/// Nutzlast eines AUTH-Pakets
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAnfrage {
    /// Spieler-ID; Clients senden sie als Zahl oder als Text
    #[serde(deserialize_with = "text_oder_zahl")]
    pub player_id: String,
    pub voice_id: String,
}

/// Nutzlast eines PRIO-Pakets
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioAnfrage {
    /// Optional; der Aufrufer wird ueber seinen Endpunkt ermittelt
    #[serde(default, deserialize_with = "optional_text_oder_zahl")]
    pub player_id: Option<String>,
    pub setting_type: String,
    pub value: serde_json::Value,
}

impl PrioAnfrage {
    /// Wert in Textform, wie ihn auch der Stream-Kanal liefert
    pub fn wert_als_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            anderer => anderer.to_string(),
        }
    }
}

/// Audio-Datagramm eines Sprechers (ohne Kopie der Nutzdaten)
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceDatagramm<'a> {
    /// Sprecher-ID ohne Auffuell-Nullen
    pub sprecher_id: String,
    pub audio: &'a [u8],
}

/// Dekodiertes Datagramm
#[derive(Debug, Clone, PartialEq)]
pub enum DatagrammPaket<'a> {
    Auth(AuthAnfrage),
    Prio(PrioAnfrage),
    Ping,
    Voice(VoiceDatagramm<'a>),
}

impl<'a> DatagrammPaket<'a> {
    /// Dekodiert ein empfangenes Datagramm
    ///
    /// # Fehler
    /// - `ZuKurz` fuer Pakete unter 4 Bytes bzw. Audio unter 20 Bytes
    /// - `Json` bei ungueltiger AUTH/PRIO-Nutzlast
    pub fn dekodieren(buf: &'a [u8]) -> ProtokollResult<Self> {
        if buf.len() < TAG_LAENGE {
            return Err(ProtokollFehler::ZuKurz {
                laenge: buf.len(),
                erwartet: TAG_LAENGE,
            });
        }

        let (tag, rest) = buf.split_at(TAG_LAENGE);
        if tag == TAG_AUTH {
            return Ok(Self::Auth(serde_json::from_slice(rest)?));
        }
        if tag == TAG_PRIO {
            return Ok(Self::Prio(serde_json::from_slice(rest)?));
        }
        if tag == TAG_PING {
            return Ok(Self::Ping);
        }

        if buf.len() < MIN_VOICE_LAENGE {
            return Err(ProtokollFehler::ZuKurz {
                laenge: buf.len(),
                erwartet: MIN_VOICE_LAENGE,
            });
        }
        let (id, audio) = buf.split_at(SPRECHER_ID_LAENGE);
        Ok(Self::Voice(VoiceDatagramm {
            sprecher_id: sprecher_id_lesen(id),
            audio,
        }))
    }
}

/// Liest eine mit Nullen aufgefuellte Sprecher-ID
pub fn sprecher_id_lesen(feld: &[u8]) -> String {
    let ende = feld.iter().position(|&b| b == 0).unwrap_or(feld.len());
    String::from_utf8_lossy(&feld[..ende]).trim().to_string()
}

fn sprecher_id_schreiben(ziel: &mut Vec<u8>, sprecher_id: &str) {
    let mut feld = [0u8; SPRECHER_ID_LAENGE];
    let bytes = sprecher_id.as_bytes();
    let n = bytes.len().min(SPRECHER_ID_LAENGE);
    feld[..n].copy_from_slice(&bytes[..n]);
    ziel.extend_from_slice(&feld);
}

// ---------------------------------------------------------------------------
// Ausgehende Pakete
// ---------------------------------------------------------------------------

/// Ergebnis einer AUTH- oder PRIO-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntwortStatus {
    Success,
    Rejected,
    Error,
}

/// JSON-Teil einer Status-Antwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusAntwort {
    pub status: AntwortStatus,
    pub message: String,
}

impl StatusAntwort {
    pub fn neu(status: AntwortStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Kodiert eine Status-Antwort: Tag + JSON
pub fn status_antwort_kodieren(tag: [u8; 4], antwort: &StatusAntwort) -> ProtokollResult<Vec<u8>> {
    let json = serde_json::to_vec(antwort)?;
    let mut buf = Vec::with_capacity(TAG_LAENGE + json.len());
    buf.extend_from_slice(&tag);
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Kodiert ein Audio-Paket an einen Zuhoerer
pub fn voice_antwort_kodieren(sprecher_id: &str, lautstaerke: f32, audio: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MIN_VOICE_LAENGE + audio.len());
    sprecher_id_schreiben(&mut buf, sprecher_id);
    buf.extend_from_slice(&lautstaerke.to_le_bytes());
    buf.extend_from_slice(audio);
    buf
}

/// Kodiert ein Audio-Datagramm wie es ein Client sendet
pub fn voice_datagramm_kodieren(sprecher_id: &str, audio: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SPRECHER_ID_LAENGE + audio.len());
    sprecher_id_schreiben(&mut buf, sprecher_id);
    buf.extend_from_slice(audio);
    buf
}

// ---------------------------------------------------------------------------
// serde-Hilfen
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOderZahl {
    Text(String),
    Zahl(i64),
}

impl From<TextOderZahl> for String {
    fn from(wert: TextOderZahl) -> Self {
        match wert {
            TextOderZahl::Text(s) => s,
            TextOderZahl::Zahl(n) => n.to_string(),
        }
    }
}

fn text_oder_zahl<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    TextOderZahl::deserialize(d).map(String::from)
}

fn optional_text_oder_zahl<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<TextOderZahl>::deserialize(d)?.map(String::from))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_mit_zahl_und_text() {
        let p = DatagrammPaket::dekodieren(br#"AUTH{"playerId":42,"voiceId":"k"}"#).unwrap();
        assert_eq!(
            p,
            DatagrammPaket::Auth(AuthAnfrage {
                player_id: "42".into(),
                voice_id: "k".into()
            })
        );

        let p = DatagrammPaket::dekodieren(br#"AUTH{"playerId":"42","voiceId":"k"}"#).unwrap();
        assert!(matches!(p, DatagrammPaket::Auth(a) if a.player_id == "42"));
    }

    #[test]
    fn auth_ohne_json_ist_fehler() {
        let err = DatagrammPaket::dekodieren(b"AUTHkaputt").unwrap_err();
        assert!(matches!(err, ProtokollFehler::Json(_)));
    }

    #[test]
    fn prio_wert_als_text() {
        let DatagrammPaket::Prio(p) =
            DatagrammPaket::dekodieren(br#"PRIO{"settingType":"ENABLED","value":true}"#).unwrap()
        else {
            panic!("PRIO erwartet");
        };
        assert_eq!(p.player_id, None);
        assert_eq!(p.wert_als_text(), "true");

        let DatagrammPaket::Prio(p) = DatagrammPaket::dekodieren(
            br#"PRIO{"playerId":5,"settingType":"THRESHOLD","value":"9"}"#,
        )
        .unwrap() else {
            panic!("PRIO erwartet");
        };
        assert_eq!(p.player_id.as_deref(), Some("5"));
        assert_eq!(p.wert_als_text(), "9");
    }

    #[test]
    fn ping() {
        assert_eq!(DatagrammPaket::dekodieren(b"PING").unwrap(), DatagrammPaket::Ping);
    }

    #[test]
    fn kurze_pakete() {
        assert!(matches!(
            DatagrammPaket::dekodieren(b"AU"),
            Err(ProtokollFehler::ZuKurz { erwartet: 4, .. })
        ));
        assert!(matches!(
            DatagrammPaket::dekodieren(&[1u8; 19]),
            Err(ProtokollFehler::ZuKurz { erwartet: 20, .. })
        ));
    }

    #[test]
    fn voice_datagramm() {
        let paket = voice_datagramm_kodieren("17", &[9, 8, 7, 6]);
        assert_eq!(paket.len(), 20);
        match DatagrammPaket::dekodieren(&paket).unwrap() {
            DatagrammPaket::Voice(v) => {
                assert_eq!(v.sprecher_id, "17");
                assert_eq!(v.audio, &[9, 8, 7, 6]);
            }
            anderes => panic!("Voice erwartet, war {anderes:?}"),
        }
    }

    #[test]
    fn voice_antwort_layout() {
        let paket = voice_antwort_kodieren("3", 0.5, &[1, 2]);
        assert_eq!(paket.len(), 22);
        assert_eq!(&paket[..2], b"3\0");
        assert!(paket[1..16].iter().all(|&b| b == 0));
        assert_eq!(f32::from_le_bytes(paket[16..20].try_into().unwrap()), 0.5);
        assert_eq!(&paket[20..], &[1, 2]);
    }

    #[test]
    fn lange_sprecher_id_wird_abgeschnitten() {
        let paket = voice_antwort_kodieren("12345678901234567890", 1.0, &[]);
        assert_eq!(sprecher_id_lesen(&paket[..16]), "1234567890123456");
    }

    #[test]
    fn status_antwort() {
        let paket =
            status_antwort_kodieren(TAG_AUTH, &StatusAntwort::neu(AntwortStatus::Rejected, "nein"))
                .unwrap();
        assert_eq!(&paket[..4], b"AUTH");
        let json: serde_json::Value = serde_json::from_slice(&paket[4..]).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["message"], "nein");
    }
}
