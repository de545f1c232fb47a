//! proxima-server – Bibliotheks-Root
//!
//! Verdrahtet Spiel-Listener und Voice-Kanaele und stellt den oeffentlichen
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod logging;
pub mod spiel;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::ServerConfig;
use proxima_core::{InMemoryAccountRegistry, InMemorySessionRegistry};
use proxima_net::{ConnectionAcceptor, FrameHandler};
use proxima_voice::{DatagramVoiceServer, PrioritySettingsRegistry, StreamVoiceServer, VoiceKontext};
use spiel::{LeereSpiellogik, SpielBruecke};
use tokio::sync::watch;

/// Haelt Konfiguration und Kollaborateure zusammen
pub struct Server {
    pub config: ServerConfig,
    sitzungen: InMemorySessionRegistry,
    konten: InMemoryAccountRegistry,
    spiellogik: Arc<dyn FrameHandler>,
}

/// Adressen und Handles eines gestarteten Servers
pub struct LaufenderServer {
    acceptor: ConnectionAcceptor,
    stream: Option<StreamVoiceServer>,
    datagramm: Option<DatagramVoiceServer>,
    kontext: Arc<VoiceKontext>,
    shutdown_tx: watch::Sender<bool>,
    pub spiel_adressen: Vec<SocketAddr>,
    pub stream_adresse: Option<SocketAddr>,
    pub datagramm_adresse: Option<SocketAddr>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self {
            config,
            sitzungen: InMemorySessionRegistry::neu(),
            konten: InMemoryAccountRegistry::neu(),
            spiellogik: Arc::new(LeereSpiellogik),
        }
    }

    /// Haengt die Spiellogik fuer den Spiel-Listener ein
    pub fn mit_spiellogik(mut self, logik: Arc<dyn FrameHandler>) -> Self {
        self.spiellogik = logik;
        self
    }

    /// Sitzungsregister, das die Spiellogik befuellt
    pub fn sitzungen(&self) -> &InMemorySessionRegistry {
        &self.sitzungen
    }

    pub fn konten(&self) -> &InMemoryAccountRegistry {
        &self.konten
    }

    /// Startet alle Subsysteme
    ///
    /// Reihenfolge:
    /// 1. Spiel-Listener (Arena, Pools, Admission Control)
    /// 2. Voice-Stream (teilt die Admission Control des Spiel-Listeners)
    /// 3. Voice-Datagramme inklusive Sweep
    pub async fn starten(&self) -> Result<LaufenderServer> {
        let cfg = &self.config;
        cfg.validieren()?;

        tracing::info!(
            server_name = %cfg.server.name,
            max_verbindungen = cfg.server.max_verbindungen,
            "Server startet"
        );

        let bruecke = SpielBruecke::neu(self.sitzungen.clone(), Arc::clone(&self.spiellogik));
        let acceptor = ConnectionAcceptor::neu(cfg.acceptor_konfiguration()?, Arc::new(bruecke));
        let spiel_adressen = acceptor
            .starten()
            .await
            .context("Spiel-Listener konnte nicht starten")?;

        let kontext = Arc::new(VoiceKontext::neu(
            Arc::new(self.sitzungen.clone()),
            Arc::new(self.konten.clone()),
            PrioritySettingsRegistry::neu(cfg.prioritaet.clone()),
            cfg.voice.reichweite,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut laufend = LaufenderServer {
            acceptor,
            stream: None,
            datagramm: None,
            kontext: Arc::clone(&kontext),
            shutdown_tx,
            spiel_adressen,
            stream_adresse: None,
            datagramm_adresse: None,
        };

        if let Err(e) = self.voice_starten(&mut laufend, kontext, shutdown_rx).await {
            laufend.stoppen().await;
            return Err(e);
        }

        tracing::info!(
            spiel = ?laufend.spiel_adressen,
            voice_stream = ?laufend.stream_adresse,
            voice_datagramm = ?laufend.datagramm_adresse,
            "Server laeuft"
        );
        Ok(laufend)
    }

    async fn voice_starten(
        &self,
        laufend: &mut LaufenderServer,
        kontext: Arc<VoiceKontext>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let cfg = &self.config;

        if cfg.voice.stream_aktiviert {
            let stream = StreamVoiceServer::neu(
                cfg.stream_konfiguration()?,
                Arc::clone(&kontext),
                laufend.acceptor.admission(),
            );
            let adresse = stream
                .starten(shutdown_rx.clone())
                .await
                .context("Voice-Stream konnte nicht starten")?;
            laufend.stream = Some(stream);
            laufend.stream_adresse = Some(adresse);
        }

        if cfg.voice.datagramm_aktiviert {
            let datagramm = DatagramVoiceServer::binden(cfg.datagramm_konfiguration()?, kontext)
                .await
                .context("Voice-Datagramm-Socket konnte nicht binden")?;
            datagramm.starten(shutdown_rx);
            laufend.datagramm_adresse = Some(datagramm.lokale_adresse()?);
            laufend.datagramm = Some(datagramm);
        }
        Ok(())
    }
}

impl LaufenderServer {
    pub fn acceptor(&self) -> &ConnectionAcceptor {
        &self.acceptor
    }

    pub fn stream(&self) -> Option<&StreamVoiceServer> {
        self.stream.as_ref()
    }

    pub fn datagramm(&self) -> Option<&DatagramVoiceServer> {
        self.datagramm.as_ref()
    }

    pub fn voice_kontext(&self) -> &Arc<VoiceKontext> {
        &self.kontext
    }

    /// Stoppt Voice-Kanaele und Spiel-Listener und wartet auf alle Tasks
    pub async fn stoppen(self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(stream) = &self.stream {
            stream.beendet().await;
        }
        if let Some(datagramm) = &self.datagramm {
            datagramm.beendet().await;
        }
        self.acceptor.stoppen().await;

        tracing::info!("Server beendet");
    }
}
