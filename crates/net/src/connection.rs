//! Gepoolte Verbindungen, Handles und die Handler-Schnittstelle
//!
//! Eine [`PooledConnection`] wird beim Start einmal konstruiert und bleibt an
//! ihre beiden Segmente gebunden. Sie ist entweder *frei* (kein Socket,
//! Zaehler auf Null, im Pool) oder *aktiv*, nie beides.

use std::net::SocketAddr;

use proxima_core::AccountId;
use proxima_protocol::SpielNachricht;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::buffer::BufferSegment;
use crate::frame::{Frame, FrameEmpfaenger, FrameSender};

/// Laufende Nummer einer Verbindung (pro Aktivierung neu)
pub type VerbindungsId = u64;

// ---------------------------------------------------------------------------
// AcceptKontext
// ---------------------------------------------------------------------------

/// Wiederverwendbarer Kontext eines ausstehenden Accepts
#[derive(Debug, Default)]
pub struct AcceptKontext {
    socket: Option<TcpStream>,
    peer: Option<SocketAddr>,
    verwendungen: u64,
}

impl AcceptKontext {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haelt das Ergebnis eines erfolgreichen Accepts fest
    pub fn abgeschlossen(&mut self, socket: TcpStream, peer: SocketAddr) {
        self.socket = Some(socket);
        self.peer = Some(peer);
        self.verwendungen += 1;
    }

    /// Entnimmt den akzeptierten Socket
    pub fn entnehmen(&mut self) -> Option<(TcpStream, SocketAddr)> {
        let socket = self.socket.take()?;
        let peer = self.peer.take()?;
        Some((socket, peer))
    }

    /// Schliesst einen verwaisten Socket und leert den Kontext
    pub fn zuruecksetzen(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(peer = ?self.peer, "Verwaisten Socket geschlossen");
            drop(socket);
        }
        self.peer = None;
    }

    pub fn verwendungen(&self) -> u64 {
        self.verwendungen
    }
}

// ---------------------------------------------------------------------------
// PooledConnection
// ---------------------------------------------------------------------------

/// Langlebiger Verbindungsplatz mit festen Segmenten
#[derive(Debug)]
pub struct PooledConnection {
    slot: usize,
    pub(crate) empfang: FrameEmpfaenger,
    pub(crate) senden: FrameSender,
    pub(crate) socket: Option<TcpStream>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) identitaet: Option<AccountId>,
}

impl PooledConnection {
    pub fn neu(slot: usize, empfang: BufferSegment, senden: BufferSegment) -> Self {
        Self {
            slot,
            empfang: FrameEmpfaenger::neu(empfang),
            senden: FrameSender::neu(senden),
            socket: None,
            peer: None,
            identitaet: None,
        }
    }

    /// Bindet einen akzeptierten Socket
    pub fn aktivieren(&mut self, socket: TcpStream, peer: SocketAddr) {
        debug_assert!(self.socket.is_none(), "Verbindung war noch aktiv");
        self.socket = Some(socket);
        self.peer = Some(peer);
    }

    /// Setzt alle Zaehler zurueck und entbindet Socket und Identitaet
    ///
    /// Die Segmente bleiben gebunden.
    pub fn zuruecksetzen(&mut self) -> Option<TcpStream> {
        self.empfang.zuruecksetzen();
        self.senden.zuruecksetzen();
        self.identitaet = None;
        self.peer = None;
        self.socket.take()
    }

    pub fn ist_aktiv(&self) -> bool {
        self.socket.is_some()
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn empfangs_offset(&self) -> usize {
        self.empfang.segment_offset()
    }

    pub fn sende_offset(&self) -> usize {
        self.senden.segment_offset()
    }

    pub fn identitaet(&self) -> Option<AccountId> {
        self.identitaet
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Befehl an den Task einer Verbindung
#[derive(Debug, Clone, PartialEq)]
pub enum Ausgehend {
    Nachricht(SpielNachricht),
    /// Verbindung schliessen (mit Grund fuer das Log)
    Trennen(String),
}

/// Klonbarer Zugriff auf eine aktive Verbindung
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: VerbindungsId,
    peer: SocketAddr,
    tx: mpsc::Sender<Ausgehend>,
}

impl ConnectionHandle {
    pub fn neu(id: VerbindungsId, peer: SocketAddr, tx: mpsc::Sender<Ausgehend>) -> Self {
        Self { id, peer, tx }
    }

    /// Reiht eine Nachricht ein; `false` wenn die Queue voll oder geschlossen ist
    pub fn senden(&self, nachricht: SpielNachricht) -> bool {
        match self.tx.try_send(Ausgehend::Nachricht(nachricht)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = self.id, peer = %self.peer, "Ausgangs-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Fordert das Trennen der Verbindung an
    pub fn trennen(&self, grund: impl Into<String>) -> bool {
        self.tx.try_send(Ausgehend::Trennen(grund.into())).is_ok()
    }

    pub fn ist_offen(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn id(&self) -> VerbindungsId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

// ---------------------------------------------------------------------------
// FrameHandler
// ---------------------------------------------------------------------------

/// Ergebnis der Frame-Verarbeitung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAktion {
    Weiter,
    Trennen,
}

/// Zugriff des Handlers auf die Verbindung waehrend eines Frames
pub struct VerbindungsKontext<'a> {
    handle: &'a ConnectionHandle,
    identitaet: &'a mut Option<AccountId>,
}

impl<'a> VerbindungsKontext<'a> {
    pub(crate) fn neu(handle: &'a ConnectionHandle, identitaet: &'a mut Option<AccountId>) -> Self {
        Self { handle, identitaet }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        self.handle
    }

    pub fn identitaet(&self) -> Option<AccountId> {
        *self.identitaet
    }

    /// Bindet die authentifizierte Identitaet an die Verbindung
    pub fn identitaet_binden(&mut self, account: AccountId) {
        *self.identitaet = Some(account);
    }
}

/// Anwendungslogik oberhalb des Framings
///
/// Wird synchron aus dem Task der Verbindung aufgerufen; lange Arbeit gehoert
/// in eigene Tasks.
pub trait FrameHandler: Send + Sync + 'static {
    /// Neue Verbindung aktiv
    fn verbunden(&self, _handle: &ConnectionHandle) {}

    /// Vollstaendiger Frame empfangen
    fn frame_empfangen(&self, ctx: &mut VerbindungsKontext<'_>, frame: Frame<'_>) -> FrameAktion;

    /// Verbindung beendet und an den Pool zurueckgegeben
    fn getrennt(&self, _id: VerbindungsId, _identitaet: Option<AccountId>) {}
}
