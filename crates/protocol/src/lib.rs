//! proxima-protocol – Drahtformate des Netzwerkrands
//!
//! - [`game`]: 5-Byte-Header des Spielprotokolls und die Nachrichten, die
//!   der Netzwerkrand selbst sendet
//! - [`wire`]: Framing des Voice-Streams (u32 LE + UTF-8)
//! - [`control`]: Befehle innerhalb des Voice-Streams
//! - [`voice`]: getaggte Voice-Datagramme
//! - [`priority`]: Prioritaets-Einstellungen beider Voice-Kanaele

pub mod control;
pub mod error;
pub mod game;
pub mod priority;
pub mod voice;
pub mod wire;

pub use control::{ProximityVoiceNachricht, StreamBefehl, VoiceDaten};
pub use error::{ProtokollFehler, ProtokollResult};
pub use game::{FrameKopf, NachrichtId, SpielNachricht, KOPF_GROESSE, STANDARD_PUFFER_GROESSE};
pub use priority::PrioritaetsBefehl;
pub use voice::{AntwortStatus, AuthAnfrage, DatagrammPaket, PrioAnfrage, StatusAntwort, VoiceDatagramm};
pub use wire::VoiceStreamCodec;
