//! BufferArena – ein grosser, einmal allozierter Speicherbereich
//!
//! Die Arena wird beim Start in gleich grosse Segmente zerlegt. Jede gepoolte
//! Verbindung erhaelt genau ein Empfangs- und ein Sende-Segment und behaelt
//! beide bis zum Ende des Prozesses. Im laufenden Betrieb wird pro Verbindung
//! nichts mehr alloziert.

use std::ops::{Deref, DerefMut};

use bytes::BytesMut;

/// Ein festes Segment der Arena
///
/// `BytesMut::split_to` teilt die Allokation ohne Kopie; jedes Segment ist
/// exklusiver Besitzer seines Bereichs.
#[derive(Debug)]
pub struct BufferSegment {
    offset: usize,
    puffer: BytesMut,
}

impl BufferSegment {
    /// Position des Segments innerhalb der Arena (unveraenderlich)
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kapazitaet(&self) -> usize {
        self.puffer.len()
    }
}

impl Deref for BufferSegment {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.puffer
    }
}

impl DerefMut for BufferSegment {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.puffer
    }
}

/// Vorab allozierter Speicher, zerlegt in Segmente fester Groesse
#[derive(Debug)]
pub struct BufferArena {
    segment_groesse: usize,
    gesamt: usize,
    /// Noch nicht vergebene Segmente (umgekehrt, `pop` liefert das naechste)
    frei: Vec<BufferSegment>,
}

impl BufferArena {
    /// Alloziert `anzahl * segment_groesse` Bytes auf einmal
    pub fn neu(anzahl: usize, segment_groesse: usize) -> Self {
        let gesamt = anzahl * segment_groesse;
        let mut region = BytesMut::zeroed(gesamt);

        let mut frei = Vec::with_capacity(anzahl);
        for i in 0..anzahl {
            frei.push(BufferSegment {
                offset: i * segment_groesse,
                puffer: region.split_to(segment_groesse),
            });
        }
        frei.reverse();

        tracing::debug!(
            segmente = anzahl,
            segment_groesse,
            bytes = gesamt,
            "BufferArena alloziert"
        );

        Self {
            segment_groesse,
            gesamt,
            frei,
        }
    }

    /// Vergibt das naechste freie Segment
    pub fn segment_vergeben(&mut self) -> Option<BufferSegment> {
        self.frei.pop()
    }

    pub fn segment_groesse(&self) -> usize {
        self.segment_groesse
    }

    /// Groesse der gesamten Arena in Bytes
    pub fn gesamt_groesse(&self) -> usize {
        self.gesamt
    }

    pub fn freie_segmente(&self) -> usize {
        self.frei.len()
    }
}
