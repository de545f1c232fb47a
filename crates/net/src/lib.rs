//! proxima-net – Netzwerkrand fuer das Spielprotokoll
//!
//! Ressourcenmodell:
//! - [`BufferArena`]: ein einziger Speicherblock, in feste Segmente zerlegt
//! - [`OperationPool`] / [`ConnectionPool`]: begrenzte Pools wiederverwendbarer
//!   Objekte
//! - [`AdmissionControl`]: zaehlendes Permit als Gegendruck am Listener
//! - [`ConnectionAcceptor`]: Listener pro Port, Verbindungs-Tasks mit den
//!   Zustandsmaschinen aus [`frame`]

pub mod acceptor;
pub mod admission;
pub mod buffer;
pub mod connection;
pub mod error;
pub mod frame;
pub mod pool;

pub use acceptor::{AcceptorKonfiguration, AcceptorStatistik, ConnectionAcceptor};
pub use admission::AdmissionControl;
pub use buffer::{BufferArena, BufferSegment};
pub use connection::{
    AcceptKontext, Ausgehend, ConnectionHandle, FrameAktion, FrameHandler, PooledConnection,
    VerbindungsId, VerbindungsKontext,
};
pub use error::{NetzFehler, NetzResult};
pub use frame::{Frame, FrameEmpfaenger, FrameSender, ReceiveFrameState, SendFrameState, SendZustand};
pub use pool::{ConnectionPool, ObjektPool, OperationPool};
