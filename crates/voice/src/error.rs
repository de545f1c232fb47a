//! Fehlertypen des Voice-Relays

use std::io;
use std::net::SocketAddr;

use proxima_core::{AccountId, ProximaError};
use proxima_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehler beider Voice-Kanaele
#[derive(Debug, Error)]
pub enum VoiceFehler {
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),

    /// Fehler eines Kollaborateurs (Konto-/Sitzungsregister)
    #[error("Registerfehler: {0}")]
    Register(#[from] ProximaError),

    #[error("Ungueltige Spieler-ID: {0:?}")]
    UngueltigeSpielerId(String),

    #[error("Konto unbekannt: {0}")]
    KontoUnbekannt(AccountId),

    #[error("Voice-Kennung passt nicht zu {0}")]
    KennungFalsch(AccountId),

    #[error("{0} ist in keiner Welt aktiv")]
    NichtInWelt(AccountId),

    /// Kein authentifizierter Spieler hinter dem Endpunkt
    #[error("Unbekannter Aufrufer: {0}")]
    AufruferUnbekannt(SocketAddr),

    #[error("Manuelle Prioritaetsliste voll ({0} Plaetze)")]
    ManuellVoll(usize),
}

impl VoiceFehler {
    /// Wurde die Anfrage inhaltlich abgelehnt (statt technisch gescheitert)?
    pub fn ist_ablehnung(&self) -> bool {
        matches!(
            self,
            Self::UngueltigeSpielerId(_)
                | Self::KontoUnbekannt(_)
                | Self::KennungFalsch(_)
                | Self::NichtInWelt(_)
                | Self::AufruferUnbekannt(_)
                | Self::ManuellVoll(_)
                | Self::Protokoll(_)
        )
    }
}

/// Result-Alias fuer das Voice-Crate
pub type VoiceResult<T> = Result<T, VoiceFehler>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ablehnung_vs_fehler() {
        assert!(VoiceFehler::KennungFalsch(AccountId(1)).ist_ablehnung());
        assert!(VoiceFehler::NichtInWelt(AccountId(1)).ist_ablehnung());
        assert!(!VoiceFehler::Register(ProximaError::intern("db weg")).ist_ablehnung());
        assert!(!VoiceFehler::Io(io::Error::other("x")).ist_ablehnung());
    }
}
