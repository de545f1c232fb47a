//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use proxima_net::AcceptorKonfiguration;
use proxima_protocol::STANDARD_PUFFER_GROESSE;
use proxima_voice::{
    DatagrammKonfiguration, StreamKonfiguration, VoicePrioritySettings, Zustellung,
    STANDARD_REICHWEITE,
};
use serde::{Deserialize, Serialize};

use crate::logging;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Proximity-Voice
    pub voice: VoiceEinstellungen,
    /// Vorlage fuer die Prioritaets-Einstellungen neuer Welten
    pub prioritaet: VoicePrioritySettings,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen (Admission Control)
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Proxima".into(),
            max_verbindungen: 256,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Ports des Spielprotokolls (ein Listener pro Port)
    pub spiel_ports: Vec<u16>,
    /// Port fuer Voice-Stream (TCP) und Voice-Datagramme (UDP)
    pub voice_port: u16,
    /// Segmentgroesse pro Verbindung und Richtung in Bytes
    pub segment_groesse: usize,
    /// Vorab allozierte Accept-Kontexte
    pub accept_kontexte: usize,
    pub backlog: u32,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            spiel_ports: vec![2050],
            voice_port: 2051,
            segment_groesse: STANDARD_PUFFER_GROESSE,
            accept_kontexte: 10,
            backlog: 100,
        }
    }
}

/// Proximity-Voice-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEinstellungen {
    /// Hoerweite in Welt-Einheiten
    pub reichweite: f32,
    pub stream_aktiviert: bool,
    pub datagramm_aktiviert: bool,
    /// "stream" oder "game"
    pub zustellung: Zustellung,
    pub max_nachricht_bytes: usize,
    pub sweep_intervall_sek: u64,
    pub endpunkt_timeout_sek: u64,
}

impl Default for VoiceEinstellungen {
    fn default() -> Self {
        Self {
            reichweite: STANDARD_REICHWEITE,
            stream_aktiviert: true,
            datagramm_aktiviert: true,
            zustellung: Zustellung::Stream,
            max_nachricht_bytes: proxima_protocol::wire::DEFAULT_MAX_NACHRICHT,
            sweep_intervall_sek: 15,
            endpunkt_timeout_sek: 45,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        Ok(config)
    }

    /// Parst und validiert eine Konfiguration
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.bind_ip()?;
        if self.server.max_verbindungen == 0 {
            anyhow::bail!("server.max_verbindungen muss groesser als 0 sein");
        }
        if self.netzwerk.spiel_ports.is_empty() {
            anyhow::bail!("netzwerk.spiel_ports darf nicht leer sein");
        }
        if self.netzwerk.segment_groesse < proxima_protocol::KOPF_GROESSE {
            anyhow::bail!(
                "netzwerk.segment_groesse ({}) ist kleiner als der Frame-Header",
                self.netzwerk.segment_groesse
            );
        }
        if !(self.voice.reichweite.is_finite() && self.voice.reichweite > 0.0) {
            anyhow::bail!("voice.reichweite muss positiv sein");
        }
        if !logging::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Unbekanntes Log-Level '{}'", self.logging.level);
        }
        if !logging::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        Ok(())
    }

    pub fn bind_ip(&self) -> anyhow::Result<IpAddr> {
        self.netzwerk
            .bind_adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.netzwerk.bind_adresse))
    }

    /// Gibt die vollstaendige Bind-Adresse der Voice-Kanaele zurueck
    pub fn voice_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.netzwerk.voice_port))
    }

    pub fn acceptor_konfiguration(&self) -> anyhow::Result<AcceptorKonfiguration> {
        Ok(AcceptorKonfiguration {
            bind_adresse: self.bind_ip()?,
            ports: self.netzwerk.spiel_ports.clone(),
            max_verbindungen: self.server.max_verbindungen,
            segment_groesse: self.netzwerk.segment_groesse,
            accept_kontexte: self.netzwerk.accept_kontexte,
            backlog: self.netzwerk.backlog,
            ..AcceptorKonfiguration::default()
        })
    }

    pub fn stream_konfiguration(&self) -> anyhow::Result<StreamKonfiguration> {
        let mut konfig = StreamKonfiguration::neu(self.voice_bind_adresse()?);
        konfig.zustellung = self.voice.zustellung;
        konfig.max_nachricht = self.voice.max_nachricht_bytes;
        Ok(konfig)
    }

    pub fn datagramm_konfiguration(&self) -> anyhow::Result<DatagrammKonfiguration> {
        let mut konfig = DatagrammKonfiguration::neu(self.voice_bind_adresse()?);
        konfig.sweep_intervall = Duration::from_secs(self.voice.sweep_intervall_sek.max(1));
        konfig.endpunkt_timeout = Duration::from_secs(self.voice.endpunkt_timeout_sek);
        Ok(konfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.server.max_verbindungen, 256);
        assert_eq!(cfg.netzwerk.spiel_ports, vec![2050]);
        assert_eq!(cfg.voice.reichweite, 15.0);
        assert_eq!(cfg.voice.zustellung, Zustellung::Stream);
        assert_eq!(cfg.prioritaet.schwelle, 8);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.voice_bind_adresse().unwrap().to_string(), "0.0.0.0:2051");

        let acceptor = cfg.acceptor_konfiguration().unwrap();
        assert_eq!(acceptor.ports, vec![2050]);
        assert_eq!(acceptor.max_verbindungen, 256);
        assert_eq!(acceptor.segment_groesse, STANDARD_PUFFER_GROESSE);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Testwelt"
            max_verbindungen = 32

            [netzwerk]
            spiel_ports = [3000, 3001]

            [voice]
            zustellung = "game"
            reichweite = 20.0

            [prioritaet]
            aktiviert = true
            schwelle = 3
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Testwelt");
        assert_eq!(cfg.server.max_verbindungen, 32);
        assert_eq!(cfg.netzwerk.spiel_ports, vec![3000, 3001]);
        assert_eq!(cfg.voice.zustellung, Zustellung::Spiel);
        assert!(cfg.prioritaet.aktiviert);
        assert_eq!(cfg.prioritaet.schwelle, 3);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.voice_port, 2051);
        assert_eq!(cfg.prioritaet.nicht_prioritaets_lautstaerke, 0.2);
        assert!(cfg.voice.datagramm_aktiviert);
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        assert!(ServerConfig::aus_toml("[netzwerk]\nbind_adresse = \"irgendwo\"").is_err());
        assert!(ServerConfig::aus_toml("[netzwerk]\nspiel_ports = []").is_err());
        assert!(ServerConfig::aus_toml("[voice]\nreichweite = 0.0").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nlevel = \"laut\"").is_err());
        assert!(ServerConfig::aus_toml("[voice]\nzustellung = \"brieftaube\"").is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/proxima.toml").unwrap();
        assert_eq!(cfg.server.name, "Proxima");
    }

    #[test]
    fn datagramm_zeiten_aus_sekunden() {
        let mut cfg = ServerConfig::default();
        cfg.voice.sweep_intervall_sek = 0;
        cfg.voice.endpunkt_timeout_sek = 10;
        let konfig = cfg.datagramm_konfiguration().unwrap();
        assert_eq!(konfig.sweep_intervall, Duration::from_secs(1));
        assert_eq!(konfig.endpunkt_timeout, Duration::from_secs(10));
    }
}
