//! Fehlertypen des Netzwerk-Crates

use std::io;

use proxima_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehler beim Betrieb des Acceptors und der Verbindungen
#[derive(Debug, Error)]
pub enum NetzFehler {
    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),

    /// Framing-Verletzung oder nicht kodierbare Nachricht
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Admission Control wurde beim Stoppen geschlossen
    #[error("Admission Control geschlossen")]
    AdmissionGeschlossen,

    /// Kein Objekt mehr im Pool, obwohl ein Permit vergeben wurde
    #[error("Pool erschoepft: {0}")]
    PoolErschoepft(&'static str),

    #[error("Acceptor laeuft bereits")]
    BereitsGestartet,

    #[error("Keine Ports konfiguriert")]
    KeinePorts,
}

/// Result-Alias fuer das Netzwerk-Crate
pub type NetzResult<T> = Result<T, NetzFehler>;
