//! Voice-Stream-Kanal (TCP)
//!
//! Jede Verbindung laeuft als eigener Task mit einem `Framed`-Stream
//! (`VoiceStreamCodec`). Nachrichten einer Verbindung werden nacheinander
//! verarbeitet; Verbindungen laufen parallel.
//!
//! ## Ablauf
//!
//! ```text
//! accept (Admission-Permit)
//!     |
//!     v
//! VOICE_CONNECT  -> anmelden -> Sitzung registrieren (alte wird geschlossen)
//! VOICE_DATA     -> mischen  -> Audio-Nachricht pro Zuhoerer
//!                               (Stream-Sitzung oder Spielverbindung)
//! PRIORITY_SETTING -> Einstellungen der eigenen Welt aendern
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use proxima_core::AccountId;
use proxima_net::AdmissionControl;
use proxima_protocol::{ProtokollFehler, ProximityVoiceNachricht, StreamBefehl, VoiceDaten, VoiceStreamCodec};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::mixer::MischKonstanten;
use crate::relay::VoiceKontext;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Zustellweg fuer Audio-Nachrichten des Stream-Kanals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zustellung {
    /// An die Voice-Stream-Sitzung des Zuhoerers
    #[default]
    Stream,
    /// Ueber die Spielverbindung des Zuhoerers (Sitzungsregister)
    #[serde(rename = "game")]
    Spiel,
}

/// Einstellungen des Stream-Kanals
#[derive(Debug, Clone)]
pub struct StreamKonfiguration {
    pub bind_adresse: SocketAddr,
    /// Maximale Nutzlast einer Nachricht in Bytes
    pub max_nachricht: usize,
    pub zustellung: Zustellung,
    /// Kapazitaet der Ausgangs-Queue pro Sitzung
    pub ausgangs_queue: usize,
}

impl StreamKonfiguration {
    pub fn neu(bind_adresse: SocketAddr) -> Self {
        Self {
            bind_adresse,
            max_nachricht: proxima_protocol::wire::DEFAULT_MAX_NACHRICHT,
            zustellung: Zustellung::Stream,
            ausgangs_queue: 128,
        }
    }
}

// ---------------------------------------------------------------------------
// Sitzungen
// ---------------------------------------------------------------------------

/// Registrierte Stream-Sitzung eines Spielers
struct StreamSitzung {
    verbindung: u64,
    tx: mpsc::Sender<String>,
    /// Schliesst die Verbindung, wenn die Sitzung ersetzt wird
    abbruch: CancellationToken,
}

/// Was die Verbindung nach einer Nachricht tun soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Folge {
    Weiter,
    Schliessen,
}

/// Zustand einer einzelnen Verbindung
struct Verbindung {
    id: u64,
    peer: SocketAddr,
    identitaet: Option<AccountId>,
    tx: mpsc::Sender<String>,
    abbruch: CancellationToken,
}

// ---------------------------------------------------------------------------
// StreamVoiceServer
// ---------------------------------------------------------------------------

/// Voice-Relay ueber TCP
///
/// Klonbar; alle Klone teilen denselben Zustand.
#[derive(Clone)]
pub struct StreamVoiceServer {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    konfig: StreamKonfiguration,
    kontext: Arc<VoiceKontext>,
    admission: Arc<AdmissionControl>,
    sitzungen: DashMap<AccountId, StreamSitzung>,
    tasks: TaskTracker,
    naechste_id: AtomicU64,
}

impl StreamVoiceServer {
    pub fn neu(
        konfig: StreamKonfiguration,
        kontext: Arc<VoiceKontext>,
        admission: Arc<AdmissionControl>,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                konfig,
                kontext,
                admission,
                sitzungen: DashMap::new(),
                tasks: TaskTracker::new(),
                naechste_id: AtomicU64::new(1),
            }),
        }
    }

    /// Bindet den Listener und startet die Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(&self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.inner.konfig.bind_adresse).await?;
        let adresse = listener.local_addr()?;
        tracing::info!(adresse = %adresse, zustellung = ?self.inner.konfig.zustellung, "Voice-Stream-Server gestartet");

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(accept_loop(inner, listener, shutdown_rx));
        Ok(adresse)
    }

    /// Wartet bis Accept-Loop und alle Verbindungen beendet sind
    pub async fn beendet(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    pub fn sitzungs_anzahl(&self) -> usize {
        self.inner.sitzungen.len()
    }

    pub fn hat_sitzung(&self, account_id: AccountId) -> bool {
        self.inner.sitzungen.contains_key(&account_id)
    }
}

// ---------------------------------------------------------------------------
// Accept-Loop
// ---------------------------------------------------------------------------

async fn accept_loop(inner: Arc<StreamInner>, listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            ergebnis = inner.admission.erwerben() => {
                if ergebnis.is_err() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }

        let (socket, peer) = tokio::select! {
            ergebnis = listener.accept() => match ergebnis {
                Ok(verbindung) => verbindung,
                Err(e) => {
                    tracing::warn!(fehler = %e, "Voice-Stream: Accept fehlgeschlagen");
                    inner.admission.freigeben();
                    continue;
                }
            },
            _ = shutdown_rx.changed() => {
                inner.admission.freigeben();
                break;
            }
        };

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }
        tracing::debug!(peer = %peer, "Voice-Stream-Verbindung akzeptiert");

        let inner2 = Arc::clone(&inner);
        inner
            .tasks
            .spawn(verbindung_betreiben(inner2, socket, peer, shutdown_rx.clone()));
    }

    tracing::info!("Voice-Stream-Server gestoppt");
}

async fn verbindung_betreiben(
    inner: Arc<StreamInner>,
    socket: TcpStream,
    peer: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (tx, mut rx) = mpsc::channel::<String>(inner.konfig.ausgangs_queue);
    let mut verbindung = Verbindung {
        id: inner.naechste_id.fetch_add(1, Ordering::Relaxed),
        peer,
        identitaet: None,
        tx,
        abbruch: CancellationToken::new(),
    };
    let abbruch = verbindung.abbruch.clone();
    let mut framed = Framed::new(socket, VoiceStreamCodec::with_max_size(inner.konfig.max_nachricht));

    let grund = loop {
        tokio::select! {
            eingang = framed.next() => match eingang {
                None => break "Gegenstelle hat geschlossen",
                Some(Err(e)) => {
                    tracing::warn!(verbindung = verbindung.id, peer = %peer, fehler = %e, "Voice-Stream: Framing-Verletzung");
                    break "Framing-Verletzung";
                }
                Some(Ok(text)) => {
                    if inner.nachricht_verarbeiten(&mut verbindung, &text) == Folge::Schliessen {
                        break "Anmeldung fehlgeschlagen";
                    }
                }
            },

            Some(ausgehend) = rx.recv() => {
                if let Err(e) = framed.send(ausgehend).await {
                    tracing::debug!(verbindung = verbindung.id, fehler = %e, "Voice-Stream: Schreibfehler");
                    break "Schreibfehler";
                }
            }

            _ = abbruch.cancelled() => break "Sitzung ersetzt",

            _ = shutdown_rx.changed() => break "Server-Shutdown",
        }
    };

    tracing::debug!(verbindung = verbindung.id, peer = %peer, grund, "Voice-Stream-Verbindung endet");

    // Nur die eigene Sitzung austragen, nicht eine Nachfolgerin
    if let Some(account_id) = verbindung.identitaet {
        let id = verbindung.id;
        if inner
            .sitzungen
            .remove_if(&account_id, |_, s| s.verbindung == id)
            .is_some()
        {
            tracing::info!(account = %account_id, "Voice-Stream-Sitzung beendet");
        }
    }

    let mut socket = framed.into_inner();
    if let Err(e) = tokio::io::AsyncWriteExt::shutdown(&mut socket).await {
        if e.kind() != std::io::ErrorKind::NotConnected {
            tracing::debug!(peer = %peer, fehler = %e, "Shutdown des Sockets fehlgeschlagen");
        }
    }
    inner.admission.freigeben();
}

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

impl StreamInner {
    fn nachricht_verarbeiten(&self, verbindung: &mut Verbindung, text: &str) -> Folge {
        let befehl = match StreamBefehl::parsen(text) {
            Ok(b) => b,
            Err(e @ ProtokollFehler::UnvollstaendigeAnmeldung(_)) => {
                tracing::warn!(verbindung = verbindung.id, peer = %verbindung.peer, fehler = %e, "Voice-Stream: ungueltige Anmeldung");
                return Folge::Schliessen;
            }
            Err(e) => {
                tracing::debug!(verbindung = verbindung.id, fehler = %e, "Voice-Stream: Nachricht ignoriert");
                return Folge::Weiter;
            }
        };

        match befehl {
            StreamBefehl::Verbinden { player_id, voice_id } => {
                self.verbinden(verbindung, &player_id, &voice_id)
            }
            StreamBefehl::Daten(daten) => {
                self.daten(verbindung, daten);
                Folge::Weiter
            }
            StreamBefehl::Prioritaet { typ, wert } => {
                self.prioritaet(verbindung, &typ, &wert);
                Folge::Weiter
            }
        }
    }

    fn verbinden(&self, verbindung: &mut Verbindung, player_id: &str, voice_id: &str) -> Folge {
        match self.kontext.anmelden(player_id, voice_id) {
            Ok(account_id) => {
                self.sitzung_registrieren(verbindung, account_id);
                Folge::Weiter
            }
            Err(e) => {
                tracing::warn!(
                    verbindung = verbindung.id,
                    peer = %verbindung.peer,
                    player_id,
                    fehler = %e,
                    "Voice-Stream: Anmeldung abgelehnt"
                );
                Folge::Schliessen
            }
        }
    }

    /// Registriert die Verbindung als Sitzung; eine vorherige Sitzung auf
    /// einer anderen Verbindung wird geschlossen
    fn sitzung_registrieren(&self, verbindung: &mut Verbindung, account_id: AccountId) {
        // Wechsel der Identitaet: alte Sitzung dieser Verbindung austragen
        if let Some(alt) = verbindung.identitaet.filter(|a| *a != account_id) {
            let id = verbindung.id;
            self.sitzungen.remove_if(&alt, |_, s| s.verbindung == id);
        }

        let vorherige = self.sitzungen.insert(
            account_id,
            StreamSitzung {
                verbindung: verbindung.id,
                tx: verbindung.tx.clone(),
                abbruch: verbindung.abbruch.clone(),
            },
        );
        verbindung.identitaet = Some(account_id);

        match vorherige {
            Some(alt) if alt.verbindung != verbindung.id => {
                alt.abbruch.cancel();
                tracing::info!(account = %account_id, verbindung = verbindung.id, "Voice-Stream-Sitzung ersetzt");
            }
            Some(_) => {}
            None => {
                tracing::info!(account = %account_id, verbindung = verbindung.id, "Voice-Stream-Sitzung registriert");
            }
        }
    }

    fn daten(&self, verbindung: &mut Verbindung, daten: VoiceDaten) {
        let Ok(sprecher) = daten.player_id.parse::<AccountId>() else {
            tracing::debug!(player_id = %daten.player_id, "VOICE_DATA mit ungueltiger Spieler-ID");
            return;
        };

        match verbindung.identitaet {
            Some(gebunden) if gebunden != sprecher => {
                tracing::debug!(
                    verbindung = verbindung.id,
                    gebunden = %gebunden,
                    sprecher = %sprecher,
                    "VOICE_DATA fuer fremde Spieler-ID ignoriert"
                );
                return;
            }
            Some(_) => {
                // Nach einem Sendefehler kann die Sitzung fehlen
                if !self.sitzungen.contains_key(&sprecher) {
                    self.sitzung_registrieren(verbindung, sprecher);
                }
            }
            None => {
                // Ungebundene Verbindung darf keine bestehende Sitzung uebernehmen
                if self.sitzungen.contains_key(&sprecher) {
                    tracing::debug!(verbindung = verbindung.id, sprecher = %sprecher, "VOICE_DATA ohne Anmeldung fuer belegte Spieler-ID ignoriert");
                    return;
                }
                self.sitzung_registrieren(verbindung, sprecher);
            }
        }

        let Some(zuhoerer) = self.kontext.mischen(sprecher, daten.volume, MischKonstanten::STREAM) else {
            tracing::debug!(sprecher = %sprecher, "Keine Position fuer Sprecher");
            return;
        };

        let zeitstempel = chrono::Utc::now().timestamp_millis();
        let mut zugestellt = 0usize;
        let mut tote = Vec::new();

        for z in &zuhoerer {
            let json = match ProximityVoiceNachricht::neu(&daten, z.lautstaerke, z.distanz, zeitstempel).zu_json() {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(fehler = %e, "Audio-Nachricht nicht serialisierbar");
                    return;
                }
            };

            match self.konfig.zustellung {
                Zustellung::Stream => {
                    let Some(sitzung) = self.sitzungen.get(&z.account_id) else {
                        continue;
                    };
                    match sitzung.tx.try_send(json) {
                        Ok(()) => zugestellt += 1,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::trace!(zuhoerer = %z.account_id, "Ausgangs-Queue voll, Audio verworfen");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            tote.push((z.account_id, sitzung.verbindung));
                        }
                    }
                }
                Zustellung::Spiel => {
                    if self.kontext.sitzungen().proximity_voice_zustellen(z.account_id, &json) {
                        zugestellt += 1;
                    }
                }
            }
        }

        for (account_id, verbindung_id) in tote {
            self.sitzungen
                .remove_if(&account_id, |_, s| s.verbindung == verbindung_id);
            tracing::debug!(account = %account_id, "Voice-Stream-Sitzung nach Sendefehler entfernt");
        }

        tracing::trace!(
            sprecher = %sprecher,
            bytes = daten.audio_data.len(),
            zuhoerer = zuhoerer.len(),
            zugestellt,
            "Voice-Daten verteilt"
        );
    }

    fn prioritaet(&self, verbindung: &Verbindung, typ: &str, wert: &str) {
        let Some(aufrufer) = verbindung.identitaet else {
            tracing::debug!(verbindung = verbindung.id, "PRIORITY_SETTING ohne Anmeldung ignoriert");
            return;
        };
        if let Err(e) = self.kontext.prioritaet_aendern(aufrufer, typ, wert) {
            tracing::debug!(account = %aufrufer, typ, wert, fehler = %e, "PRIORITY_SETTING ignoriert");
        }
    }
}
