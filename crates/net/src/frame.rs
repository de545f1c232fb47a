//! Empfangs- und Sende-Zustandsmaschinen des Spielprotokolls
//!
//! Beide arbeiten ausschliesslich auf dem festen Segment ihrer Verbindung.
//!
//! Empfang: Bytes werden ab `bytes_gelesen` angehaengt. Sobald 5 Bytes
//! vorliegen, gilt die Laenge aus dem Header; vorher ist `gesamt_laenge`
//! die Header-Groesse. Ein vollstaendiger Frame wird ausgeliefert und ein
//! eventueller Rest an den Segmentanfang verschoben, sodass mehrere Frames
//! hintereinander durch denselben Puffer laufen koennen.
//!
//! Senden: `Wartend -> Bereit -> Sendend -> Wartend`.

use proxima_protocol::{FrameKopf, ProtokollResult, SpielNachricht, KOPF_GROESSE};

use crate::buffer::BufferSegment;
use crate::connection::FrameAktion;

// ---------------------------------------------------------------------------
// Empfang
// ---------------------------------------------------------------------------

/// Fortschritt des aktuell empfangenen Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveFrameState {
    pub bytes_gelesen: usize,
    /// Erst ab 5 gelesenen Bytes vertrauenswuerdig
    pub gesamt_laenge: usize,
}

impl Default for ReceiveFrameState {
    fn default() -> Self {
        Self {
            bytes_gelesen: 0,
            gesamt_laenge: KOPF_GROESSE,
        }
    }
}

/// Ein vollstaendig empfangener Frame (Header + Body)
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub kopf: FrameKopf,
    pub daten: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Body ohne Header
    pub fn body(&self) -> &'a [u8] {
        &self.daten[KOPF_GROESSE..]
    }
}

/// Empfangs-Zustandsmaschine ueber dem Empfangs-Segment
#[derive(Debug)]
pub struct FrameEmpfaenger {
    segment: BufferSegment,
    zustand: ReceiveFrameState,
}

impl FrameEmpfaenger {
    pub fn neu(segment: BufferSegment) -> Self {
        Self {
            segment,
            zustand: ReceiveFrameState::default(),
        }
    }

    /// Freier Bereich, in den der naechste Lesevorgang schreibt
    pub fn lese_bereich(&mut self) -> &mut [u8] {
        let start = self.zustand.bytes_gelesen;
        &mut self.segment[start..]
    }

    /// Verarbeitet `n` neu gelesene Bytes
    ///
    /// Jeder vollstaendige Frame wird an `ausliefern` uebergeben. Liefert der
    /// Callback `FrameAktion::Trennen`, endet die Verarbeitung sofort.
    ///
    /// # Fehler
    /// `FrameLaenge` wenn ein Header eine Laenge ausserhalb von
    /// `5..=kapazitaet` deklariert (Framing-Verletzung).
    pub fn bytes_empfangen<F>(&mut self, n: usize, mut ausliefern: F) -> ProtokollResult<FrameAktion>
    where
        F: FnMut(Frame<'_>) -> FrameAktion,
    {
        let kapazitaet = self.segment.kapazitaet();
        self.zustand.bytes_gelesen = (self.zustand.bytes_gelesen + n).min(kapazitaet);

        loop {
            let gelesen = self.zustand.bytes_gelesen;
            let Some(kopf) = FrameKopf::lesen(&self.segment[..gelesen]) else {
                return Ok(FrameAktion::Weiter);
            };
            kopf.validieren(kapazitaet)?;
            self.zustand.gesamt_laenge = kopf.laenge;

            if gelesen < kopf.laenge {
                return Ok(FrameAktion::Weiter);
            }

            let aktion = ausliefern(Frame {
                kopf,
                daten: &self.segment[..kopf.laenge],
            });

            // Rest des naechsten Frames an den Anfang schieben
            self.segment.copy_within(kopf.laenge..gelesen, 0);
            self.zustand = ReceiveFrameState {
                bytes_gelesen: gelesen - kopf.laenge,
                gesamt_laenge: KOPF_GROESSE,
            };

            if aktion == FrameAktion::Trennen {
                return Ok(aktion);
            }
        }
    }

    pub fn zustand(&self) -> ReceiveFrameState {
        self.zustand
    }

    pub fn segment_offset(&self) -> usize {
        self.segment.offset()
    }

    pub fn zuruecksetzen(&mut self) {
        self.zustand = ReceiveFrameState::default();
    }
}

// ---------------------------------------------------------------------------
// Senden
// ---------------------------------------------------------------------------

/// Zustand der Sende-Richtung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendZustand {
    /// Nichts zu senden
    #[default]
    Wartend,
    /// Bytes liegen im Segment, Schreiben noch nicht begonnen
    Bereit,
    /// Schreibvorgang laeuft (evtl. nach Teil-Schreiben)
    Sendend,
}

/// Fortschritt der Sende-Richtung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendFrameState {
    pub bytes_verfuegbar: usize,
    pub bytes_gesendet: usize,
    pub zustand: SendZustand,
}

/// Sende-Zustandsmaschine ueber dem Sende-Segment
#[derive(Debug)]
pub struct FrameSender {
    segment: BufferSegment,
    zustand: SendFrameState,
}

impl FrameSender {
    pub fn neu(segment: BufferSegment) -> Self {
        Self {
            segment,
            zustand: SendFrameState::default(),
        }
    }

    /// Serialisiert eine Nachricht direkt ins Sende-Segment
    ///
    /// Nur im Zustand `Wartend` erlaubt; ein laufender Sendevorgang wird nie
    /// ueberschrieben. Passt die Nachricht nicht ins Segment, wird sie mit
    /// `NachrichtZuGross` abgelehnt.
    pub fn einreihen(&mut self, nachricht: &SpielNachricht) -> ProtokollResult<()> {
        debug_assert_eq!(self.zustand.zustand, SendZustand::Wartend);
        let n = nachricht.schreiben(&mut self.segment)?;
        self.zustand = SendFrameState {
            bytes_verfuegbar: n,
            bytes_gesendet: 0,
            zustand: SendZustand::Bereit,
        };
        Ok(())
    }

    /// Noch nicht uebertragene Bytes; wechselt nach `Sendend`
    pub fn ausstehend(&mut self) -> &[u8] {
        if self.zustand.zustand == SendZustand::Bereit {
            self.zustand.zustand = SendZustand::Sendend;
        }
        &self.segment[self.zustand.bytes_gesendet..self.zustand.bytes_verfuegbar]
    }

    /// Verbucht `n` geschriebene Bytes; `true` wenn alles gesendet ist
    pub fn gesendet(&mut self, n: usize) -> bool {
        self.zustand.bytes_gesendet =
            (self.zustand.bytes_gesendet + n).min(self.zustand.bytes_verfuegbar);
        if self.zustand.bytes_gesendet == self.zustand.bytes_verfuegbar {
            self.zustand = SendFrameState::default();
            return true;
        }
        false
    }

    /// Kann eine neue Nachricht eingereiht werden?
    pub fn ist_frei(&self) -> bool {
        self.zustand.zustand == SendZustand::Wartend
    }

    pub fn zustand(&self) -> SendFrameState {
        self.zustand
    }

    pub fn segment_offset(&self) -> usize {
        self.segment.offset()
    }

    pub fn zuruecksetzen(&mut self) {
        self.zustand = SendFrameState::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
