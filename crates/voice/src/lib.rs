//! proxima-voice – Proximity-Voice-Relay
//!
//! Spieler hoeren einander nur in Reichweite und in derselben Welt; die
//! Lautstaerke faellt mit der Distanz. Zwei Transporte bestehen nebeneinander:
//!
//! - [`stream`] – laengenpraefixierter Text-Stream ueber TCP
//! - [`udp`] – getaggte Datagramme mit Endpunkt-Authentifizierung
//!
//! ## Module
//! - [`relay`] – gemeinsamer Kontext (Anmeldung, Mischen, Prioritaet)
//! - [`mixer`] – Zuhoerer-Ermittlung und Lautstaerke
//! - [`settings`] – Prioritaets-Einstellungen pro Welt
//! - [`state`] – Endpunkt-Tabelle des Datagramm-Kanals

pub mod error;
pub mod mixer;
pub mod relay;
pub mod settings;
pub mod state;
pub mod stream;
pub mod udp;

pub use error::{VoiceFehler, VoiceResult};
pub use mixer::{MischKonstanten, Zuhoerer};
pub use relay::{VoiceKontext, STANDARD_REICHWEITE};
pub use settings::{PrioritySettingsRegistry, VoicePrioritySettings};
pub use state::{EndpunktTabelle, VoiceEndpunkt, ENDPUNKT_TIMEOUT};
pub use stream::{StreamKonfiguration, StreamVoiceServer, Zustellung};
pub use udp::{DatagrammKonfiguration, DatagramVoiceServer};
