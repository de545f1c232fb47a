//! proxima-core – Gemeinsame Typen, Kollaborateur-Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Proxima-Crates gemeinsam genutzt werden. Die externen
//! Kollaborateure (Sitzungs-/Positionsregister, Kontoregister) sind hier nur
//! als Traits beschrieben; [`memory`] liefert thread-sichere In-Memory-
//! Implementierungen fuer den Server-Start und fuer Tests.

pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{ProximaError, Result};
pub use memory::{InMemoryAccountRegistry, InMemorySessionRegistry, VoiceZusteller};
pub use registry::{AccountRegistry, Konto, SessionInfo, SessionRegistry};
pub use types::{AccountId, Position, WorldId};
