//! Wire-Format des Voice-Streams (TCP)
//!
//! Frame-basiertes Protokoll: Laenge (u32 little-endian) + UTF-8-Text.
//! Bewusst einfacher als das Spielprotokoll: kein Typ-Byte, der Befehl
//! steht als Praefix im Text (siehe [`crate::control`]).
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 LE)                   | UTF-8     |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtokollFehler;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Nachrichtengroesse (100 KB)
pub const DEFAULT_MAX_NACHRICHT: usize = 100_000;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// VoiceStreamCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer den Voice-Stream
///
/// Implementiert `Decoder<Item = String>` und `Encoder<String>` fuer
/// `tokio_util::codec::Framed`. Ungueltiges UTF-8 wird verlustbehaftet
/// ersetzt; der Befehls-Parser verwirft solche Nachrichten dann ohnehin.
#[derive(Debug, Clone)]
pub struct VoiceStreamCodec {
    /// Maximale erlaubte Payload-Groesse in Bytes
    max_nachricht: usize,
}

impl VoiceStreamCodec {
    /// Erstellt einen neuen Codec mit Standard-Limit
    pub fn new() -> Self {
        Self {
            max_nachricht: DEFAULT_MAX_NACHRICHT,
        }
    }

    /// Erstellt einen Codec mit benutzerdefinierter maximaler Nachrichtengroesse
    pub fn with_max_size(max_nachricht: usize) -> Self {
        Self { max_nachricht }
    }

    pub fn max_nachricht(&self) -> usize {
        self.max_nachricht
    }
}

impl Default for VoiceStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for VoiceStreamCodec {
    type Item = String;
    type Error = ProtokollFehler;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_nachricht {
            return Err(ProtokollFehler::FrameLaenge {
                laenge: length,
                min: 0,
                max: self.max_nachricht,
            });
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
    }
}

impl Encoder<String> for VoiceStreamCodec {
    type Error = ProtokollFehler;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_nachricht {
            return Err(ProtokollFehler::NachrichtZuGross {
                laenge: item.len(),
                max: self.max_nachricht,
            });
        }

        dst.reserve(LENGTH_FIELD_SIZE + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn encode_schreibt_little_endian_laenge() {
        let mut codec = VoiceStreamCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PING".to_string(), &mut buf).unwrap();

        assert_eq!(&buf[..4], &[4, 0, 0, 0]);
        assert_eq!(&buf[4..], b"PING");
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut codec = VoiceStreamCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(10);
        buf.put_slice(b"VOICE");

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.put_slice(b"_DATA");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("VOICE_DATA"));
        assert!(buf.is_empty());
    }

    #[test]
    fn zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = VoiceStreamCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_ist_framing_verletzung() {
        let mut codec = VoiceStreamCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32_le(200);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(err.ist_framing_verletzung());
    }

    #[test]
    fn mehrere_nachrichten_im_buffer() {
        let mut codec = VoiceStreamCodec::new();
        let mut buf = BytesMut::new();
        for i in 0..3 {
            codec.encode(format!("N{i}"), &mut buf).unwrap();
        }
        for i in 0..3 {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg, format!("N{i}"));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn leere_nachricht_ist_gueltig() {
        let mut codec = VoiceStreamCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn framed_round_trip_ueber_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(client, VoiceStreamCodec::new());
        let mut reader = FramedRead::new(server, VoiceStreamCodec::new());

        writer.send("VOICE_CONNECT:1:abc".to_string()).await.unwrap();
        let empfangen = reader.next().await.unwrap().unwrap();
        assert_eq!(empfangen, "VOICE_CONNECT:1:abc");
    }
}
