//! Voice-Datagramm-Kanal (UDP)
//!
//! Empfaengt getaggte Datagramme, authentifiziert Endpunkte und verteilt
//! Audio an Zuhoerer in Reichweite.
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! eigener Task pro Datagramm
//!     |
//!     +-- AUTH  -> anmelden -> EndpunktTabelle::registrieren -> Status
//!     +-- PRIO  -> Aufrufer per Adresse -> Einstellungen aendern -> Status
//!     +-- PING  -> PONG
//!     +-- Audio -> Absender pruefen -> mischen -> send_to an alle Zuhoerer
//!
//! Sweep-Task: alle 15 s Endpunkte ohne Aktivitaet seit 45 s entfernen
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use proxima_core::AccountId;
use proxima_protocol::voice::{
    status_antwort_kodieren, voice_antwort_kodieren, TAG_AUTH, TAG_PONG, TAG_PRIO,
};
use proxima_protocol::{AntwortStatus, AuthAnfrage, DatagrammPaket, PrioAnfrage, StatusAntwort, VoiceDatagramm};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;

use crate::error::{VoiceFehler, VoiceResult};
use crate::mixer::MischKonstanten;
use crate::relay::VoiceKontext;
use crate::state::{EndpunktTabelle, ENDPUNKT_TIMEOUT};

/// Groesstes UDP-Datagramm
const EMPFANGS_PUFFER: usize = 65_536;

/// Basis-Lautstaerke fuer Datagramm-Audio (das Paket traegt keine eigene)
const DATAGRAMM_BASIS_LAUTSTAERKE: f32 = 1.0;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Datagramm-Kanals
#[derive(Debug, Clone)]
pub struct DatagrammKonfiguration {
    pub bind_adresse: SocketAddr,
    /// Abstand zwischen zwei Sweep-Laeufen
    pub sweep_intervall: Duration,
    /// Inaktivitaet, nach der ein Endpunkt entfernt wird
    pub endpunkt_timeout: Duration,
}

impl DatagrammKonfiguration {
    pub fn neu(bind_adresse: SocketAddr) -> Self {
        Self {
            bind_adresse,
            sweep_intervall: Duration::from_secs(15),
            endpunkt_timeout: ENDPUNKT_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// DatagramVoiceServer
// ---------------------------------------------------------------------------

/// Voice-Relay ueber UDP
#[derive(Clone)]
pub struct DatagramVoiceServer {
    inner: Arc<DatagrammInner>,
}

struct DatagrammInner {
    konfig: DatagrammKonfiguration,
    socket: UdpSocket,
    kontext: Arc<VoiceKontext>,
    endpunkte: EndpunktTabelle,
    tasks: TaskTracker,
}

impl DatagramVoiceServer {
    /// Bindet den UDP-Socket
    pub async fn binden(konfig: DatagrammKonfiguration, kontext: Arc<VoiceKontext>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(konfig.bind_adresse).await?;
        tracing::info!(adresse = %socket.local_addr()?, "Voice-Datagramm-Server gebunden");

        Ok(Self {
            inner: Arc::new(DatagrammInner {
                konfig,
                socket,
                kontext,
                endpunkte: EndpunktTabelle::neu(),
                tasks: TaskTracker::new(),
            }),
        })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    pub fn endpunkte(&self) -> &EndpunktTabelle {
        &self.inner.endpunkte
    }

    /// Startet Empfangs- und Sweep-Loop (laufen bis `shutdown_rx` signalisiert)
    pub fn starten(&self, shutdown_rx: watch::Receiver<bool>) {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(empfangs_loop(inner, shutdown_rx.clone()));

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(sweep_loop(inner, shutdown_rx));
    }

    /// Wartet bis beide Loops und alle Paket-Tasks beendet sind
    pub async fn beendet(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

async fn empfangs_loop(inner: Arc<DatagrammInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut puffer = vec![0u8; EMPFANGS_PUFFER];
    tracing::info!("Voice-Datagramm-Empfang gestartet");

    loop {
        tokio::select! {
            ergebnis = inner.socket.recv_from(&mut puffer) => match ergebnis {
                Ok((laenge, absender)) => {
                    let daten = puffer[..laenge].to_vec();
                    let inner2 = Arc::clone(&inner);
                    inner.tasks.spawn(async move {
                        inner2.datagramm_verarbeiten(&daten, absender).await;
                    });
                }
                Err(e) => {
                    // z.B. ICMP "port unreachable" eines frueheren send_to
                    tracing::debug!(fehler = %e, "UDP-Empfangsfehler");
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    tracing::info!("Voice-Datagramm-Empfang beendet");
}

async fn sweep_loop(inner: Arc<DatagrammInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut intervall = tokio::time::interval(inner.konfig.sweep_intervall);
    intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Der erste Tick kommt sofort
    intervall.tick().await;

    loop {
        tokio::select! {
            _ = intervall.tick() => {
                let entfernt = inner.endpunkte.inaktive_bereinigen(inner.konfig.endpunkt_timeout);
                if !entfernt.is_empty() {
                    tracing::debug!(anzahl = entfernt.len(), verbleibend = inner.endpunkte.anzahl(), "Voice-Endpunkte bereinigt");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Paketverarbeitung
// ---------------------------------------------------------------------------

impl DatagrammInner {
    async fn datagramm_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        let paket = match DatagrammPaket::dekodieren(daten) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(absender = %absender, bytes = daten.len(), fehler = %e, "Datagramm verworfen");
                return;
            }
        };

        match paket {
            DatagrammPaket::Auth(anfrage) => {
                let antwort = self.auth(&anfrage, absender);
                self.status_senden(TAG_AUTH, &antwort, absender).await;
            }
            DatagrammPaket::Prio(anfrage) => {
                let antwort = self.prio(&anfrage, absender);
                self.status_senden(TAG_PRIO, &antwort, absender).await;
            }
            DatagrammPaket::Ping => {
                if let Err(e) = self.socket.send_to(&TAG_PONG, absender).await {
                    tracing::debug!(ziel = %absender, fehler = %e, "PONG nicht gesendet");
                }
            }
            DatagrammPaket::Voice(datagramm) => self.voice(datagramm, absender).await,
        }
    }

    fn auth(&self, anfrage: &AuthAnfrage, absender: SocketAddr) -> StatusAntwort {
        match self.kontext.anmelden(&anfrage.player_id, &anfrage.voice_id) {
            Ok(account_id) => {
                self.endpunkte.registrieren(account_id, absender);
                StatusAntwort::neu(AntwortStatus::Success, "Authenticated")
            }
            Err(e) => {
                tracing::warn!(absender = %absender, player_id = %anfrage.player_id, fehler = %e, "Voice-AUTH abgelehnt");
                fehler_antwort(&e)
            }
        }
    }

    fn prio(&self, anfrage: &PrioAnfrage, absender: SocketAddr) -> StatusAntwort {
        match self.prio_anwenden(anfrage, absender) {
            Ok(()) => StatusAntwort::neu(AntwortStatus::Success, "Setting updated"),
            Err(e) => {
                tracing::debug!(absender = %absender, typ = %anfrage.setting_type, fehler = %e, "Voice-PRIO abgelehnt");
                fehler_antwort(&e)
            }
        }
    }

    fn prio_anwenden(&self, anfrage: &PrioAnfrage, absender: SocketAddr) -> VoiceResult<()> {
        let aufrufer = self
            .endpunkte
            .account_von_adresse(&absender)
            .ok_or(VoiceFehler::AufruferUnbekannt(absender))?;

        // Eine mitgeschickte Spieler-ID muss zum Endpunkt passen
        if let Some(player_id) = &anfrage.player_id {
            let behauptet: AccountId = player_id
                .parse()
                .map_err(|_| VoiceFehler::UngueltigeSpielerId(player_id.clone()))?;
            if behauptet != aufrufer {
                return Err(VoiceFehler::AufruferUnbekannt(absender));
            }
        }

        self.kontext
            .prioritaet_aendern(aufrufer, &anfrage.setting_type, &anfrage.wert_als_text())?;
        Ok(())
    }

    async fn status_senden(&self, tag: [u8; 4], antwort: &StatusAntwort, ziel: SocketAddr) {
        let paket = match status_antwort_kodieren(tag, antwort) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(fehler = %e, "Status-Antwort nicht kodierbar");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&paket, ziel).await {
            tracing::debug!(ziel = %ziel, fehler = %e, "Status-Antwort nicht gesendet");
        }
    }

    async fn voice(&self, datagramm: VoiceDatagramm<'_>, absender: SocketAddr) {
        let Ok(sprecher) = datagramm.sprecher_id.parse::<AccountId>() else {
            tracing::trace!(absender = %absender, "Audio mit ungueltiger Sprecher-ID verworfen");
            return;
        };

        // Nur vom registrierten Endpunkt des Sprechers
        match self.endpunkte.endpunkt(sprecher) {
            Some(e) if e.authentifiziert && e.adresse == absender => {}
            _ => {
                tracing::trace!(sprecher = %sprecher, absender = %absender, "Audio von nicht authentifiziertem Endpunkt verworfen");
                return;
            }
        }
        self.endpunkte.aktivitaet_auffrischen(sprecher);

        let Some(zuhoerer) = self
            .kontext
            .mischen(sprecher, DATAGRAMM_BASIS_LAUTSTAERKE, MischKonstanten::DATAGRAMM)
        else {
            return;
        };

        let ziele: Vec<(AccountId, SocketAddr, Vec<u8>)> = zuhoerer
            .iter()
            .filter_map(|z| {
                let endpunkt = self.endpunkte.endpunkt(z.account_id)?;
                if !endpunkt.authentifiziert {
                    return None;
                }
                let paket = voice_antwort_kodieren(&datagramm.sprecher_id, z.lautstaerke, datagramm.audio);
                Some((z.account_id, endpunkt.adresse, paket))
            })
            .collect();

        let sendungen = ziele.iter().map(|(account_id, adresse, paket)| async move {
            (*account_id, *adresse, self.socket.send_to(paket, *adresse).await)
        });
        let ergebnisse = join_all(sendungen).await;

        let mut gesendet = 0usize;
        for (account_id, adresse, ergebnis) in ergebnisse {
            match ergebnis {
                Ok(_) => gesendet += 1,
                Err(e) => {
                    tracing::debug!(account = %account_id, ziel = %adresse, fehler = %e, "Audio nicht zustellbar, Endpunkt entfernt");
                    self.endpunkte.entfernen(account_id);
                }
            }
        }

        tracing::trace!(
            sprecher = %sprecher,
            bytes = datagramm.audio.len(),
            zuhoerer = zuhoerer.len(),
            gesendet,
            "Voice-Datagramm verteilt"
        );
    }
}

fn fehler_antwort(fehler: &VoiceFehler) -> StatusAntwort {
    let status = if fehler.ist_ablehnung() {
        AntwortStatus::Rejected
    } else {
        AntwortStatus::Error
    };
    StatusAntwort::neu(status, fehler.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{PrioritySettingsRegistry, VoicePrioritySettings};
    use proxima_core::{InMemoryAccountRegistry, InMemorySessionRegistry, Konto, Position, WorldId};
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn kontext() -> Arc<VoiceKontext> {
        let sitzungen = InMemorySessionRegistry::neu();
        let konten = InMemoryAccountRegistry::neu();
        sitzungen.spieler_setzen(AccountId(1), Some(Position::neu(0.0, 0.0, WorldId(1))));
        konten.konto_setzen(Konto::neu(AccountId(1), "geheim"));
        Arc::new(VoiceKontext::neu(
            Arc::new(sitzungen),
            Arc::new(konten),
            PrioritySettingsRegistry::neu(VoicePrioritySettings::default()),
            15.0,
        ))
    }

    #[tokio::test]
    async fn binden_waehlt_port() {
        let server = DatagramVoiceServer::binden(DatagrammKonfiguration::neu(localhost(0)), kontext())
            .await
            .expect("Server muss binden koennen");
        assert_ne!(server.lokale_adresse().unwrap().port(), 0);
    }

    #[test]
    fn ablehnung_und_fehler_unterscheiden() {
        let abgelehnt = fehler_antwort(&VoiceFehler::KennungFalsch(AccountId(1)));
        assert_eq!(abgelehnt.status, AntwortStatus::Rejected);

        let technisch = fehler_antwort(&VoiceFehler::Io(std::io::Error::other("weg")));
        assert_eq!(technisch.status, AntwortStatus::Error);
    }

    #[tokio::test]
    async fn sweep_entfernt_inaktive_endpunkte() {
        let mut konfig = DatagrammKonfiguration::neu(localhost(0));
        konfig.sweep_intervall = Duration::from_millis(20);
        konfig.endpunkt_timeout = Duration::from_millis(50);

        let server = DatagramVoiceServer::binden(konfig, kontext()).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        server.starten(shutdown_rx);

        server.endpunkte().registrieren(AccountId(1), localhost(40000));
        assert_eq!(server.endpunkte().anzahl(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(server.endpunkte().anzahl(), 0);
        assert!(server.endpunkte().account_von_adresse(&localhost(40000)).is_none());

        shutdown_tx.send(true).unwrap();
        server.beendet().await;
    }
}
