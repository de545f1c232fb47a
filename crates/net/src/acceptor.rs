//! ConnectionAcceptor – Listener, Accept-Loops und Verbindungs-Tasks
//!
//! ## Ablauf pro Port
//! 1. Admission-Permit erwerben (einzige blockierende Stelle)
//! 2. Accept-Kontext aus dem OperationPool holen (nur bei leerem Pool neu)
//! 3. Accept; bei Erfolg eine `PooledConnection` binden, Kontext zurueck,
//!    sofort neu scharf schalten
//! 4. Bei Fehler: verwaisten Socket schliessen, Kontext zurueck, Permit
//!    freigeben, weitermachen
//!
//! Jede aktive Verbindung laeuft als eigener Task, der Empfang, Senden und
//! Ausgangs-Queue per `select!` bedient.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proxima_protocol::STANDARD_PUFFER_GROESSE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;

use crate::admission::AdmissionControl;
use crate::buffer::BufferArena;
use crate::connection::{
    AcceptKontext, Ausgehend, ConnectionHandle, FrameAktion, FrameHandler, PooledConnection,
    VerbindungsKontext,
};
use crate::error::{NetzFehler, NetzResult};
use crate::pool::{ConnectionPool, OperationPool};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Einstellungen des Acceptors
#[derive(Debug, Clone)]
pub struct AcceptorKonfiguration {
    pub bind_adresse: IpAddr,
    pub ports: Vec<u16>,
    /// Obergrenze gleichzeitig aktiver Verbindungen
    pub max_verbindungen: usize,
    /// Groesse je Sende- und Empfangssegment
    pub segment_groesse: usize,
    /// Vorab angelegte Accept-Kontexte
    pub accept_kontexte: usize,
    pub backlog: u32,
    /// Kapazitaet der Ausgangs-Queue pro Verbindung
    pub ausgangs_queue: usize,
    /// Wartezeit auf laufende Verbindungs-Tasks beim Stoppen
    pub stop_timeout: Duration,
}

impl Default for AcceptorKonfiguration {
    fn default() -> Self {
        Self {
            bind_adresse: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: vec![2050],
            max_verbindungen: 256,
            segment_groesse: STANDARD_PUFFER_GROESSE,
            accept_kontexte: 10,
            backlog: 100,
            ausgangs_queue: 64,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Momentaufnahme der Acceptor-Zaehler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptorStatistik {
    pub aktive_verbindungen: usize,
    pub freie_verbindungen: usize,
    pub freie_accept_kontexte: usize,
    pub akzeptiert_gesamt: u64,
}

// ---------------------------------------------------------------------------
// ConnectionAcceptor
// ---------------------------------------------------------------------------

/// Gepoolter Acceptor fuer das Spielprotokoll
///
/// Klonbar; alle Klone teilen denselben Zustand.
#[derive(Clone)]
pub struct ConnectionAcceptor {
    inner: Arc<AcceptorInner>,
}

struct AcceptorInner {
    konfig: AcceptorKonfiguration,
    admission: Arc<AdmissionControl>,
    verbindungen: ConnectionPool,
    kontexte: OperationPool,
    handler: Arc<dyn FrameHandler>,
    tasks: TaskTracker,
    shutdown_tx: watch::Sender<bool>,
    laufend: AtomicBool,
    akzeptiert: AtomicU64,
    naechste_id: AtomicU64,
    lokale_adressen: Mutex<Vec<SocketAddr>>,
}

impl ConnectionAcceptor {
    /// Alloziert Arena und Pools
    ///
    /// Die Arena umfasst `(max_verbindungen + 1) * 2` Segmente; jede der
    /// `max_verbindungen + 1` Verbindungen bekommt ein Empfangs- und ein
    /// Sende-Segment.
    pub fn neu(konfig: AcceptorKonfiguration, handler: Arc<dyn FrameHandler>) -> Self {
        let plaetze = konfig.max_verbindungen + 1;
        let mut arena = BufferArena::neu(plaetze * 2, konfig.segment_groesse);

        let verbindungen = ConnectionPool::neu("verbindungen", plaetze);
        for slot in 0..plaetze {
            let (Some(empfang), Some(senden)) = (arena.segment_vergeben(), arena.segment_vergeben())
            else {
                break;
            };
            verbindungen.zurueckgeben(PooledConnection::neu(slot, empfang, senden));
        }

        let kontexte = OperationPool::neu("accept_kontexte", konfig.accept_kontexte);
        for _ in 0..konfig.accept_kontexte {
            kontexte.zurueckgeben(AcceptKontext::neu());
        }

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(AcceptorInner {
                admission: Arc::new(AdmissionControl::neu(konfig.max_verbindungen)),
                konfig,
                verbindungen,
                kontexte,
                handler,
                tasks: TaskTracker::new(),
                shutdown_tx,
                laufend: AtomicBool::new(false),
                akzeptiert: AtomicU64::new(0),
                naechste_id: AtomicU64::new(1),
                lokale_adressen: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Bindet alle Ports und startet die Accept-Loops
    ///
    /// Gibt die tatsaechlich gebundenen Adressen zurueck (relevant bei Port 0).
    pub async fn starten(&self) -> NetzResult<Vec<SocketAddr>> {
        if self.inner.konfig.ports.is_empty() {
            return Err(NetzFehler::KeinePorts);
        }
        if self.inner.laufend.swap(true, Ordering::AcqRel) {
            return Err(NetzFehler::BereitsGestartet);
        }

        let mut adressen = Vec::with_capacity(self.inner.konfig.ports.len());
        for &port in &self.inner.konfig.ports {
            let listener = match self.listener_binden(port) {
                Ok(l) => l,
                Err(e) => {
                    self.inner.laufend.store(false, Ordering::Release);
                    let _ = self.inner.shutdown_tx.send(true);
                    return Err(e.into());
                }
            };
            let adresse = listener.local_addr()?;
            adressen.push(adresse);

            tracing::info!(adresse = %adresse, "Spiel-Listener gestartet");

            let inner = Arc::clone(&self.inner);
            let shutdown_rx = self.inner.shutdown_tx.subscribe();
            self.inner
                .tasks
                .spawn(accept_loop(inner, listener, adresse, shutdown_rx));
        }

        self.inner.lokale_adressen.lock().extend(adressen.iter().copied());
        Ok(adressen)
    }

    fn listener_binden(&self, port: u16) -> io::Result<TcpListener> {
        let adresse = SocketAddr::new(self.inner.konfig.bind_adresse, port);
        let socket = match adresse {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(adresse)?;
        socket.listen(self.inner.konfig.backlog)
    }

    /// Stoppt Listener und Verbindungen und leert die Pools
    ///
    /// Laufende Verbindungen werden getrennt und recycelt, bevor die Pools
    /// geleert werden. Ein gestoppter Acceptor kann nicht neu gestartet werden.
    pub async fn stoppen(&self) {
        if !self.inner.laufend.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Spiel-Listener: Shutdown");

        let _ = self.inner.shutdown_tx.send(true);
        self.inner.admission.schliessen();
        self.inner.tasks.close();

        if tokio::time::timeout(self.inner.konfig.stop_timeout, self.inner.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                offen = self.inner.tasks.len(),
                "Nicht alle Verbindungs-Tasks rechtzeitig beendet"
            );
        }

        let verbindungen = self.inner.verbindungen.leeren();
        let kontexte = self.inner.kontexte.leeren();
        self.inner.lokale_adressen.lock().clear();

        tracing::info!(verbindungen, kontexte, "Spiel-Listener gestoppt, Pools geleert");
    }

    pub fn statistik(&self) -> AcceptorStatistik {
        AcceptorStatistik {
            aktive_verbindungen: self.inner.admission.aktive(),
            freie_verbindungen: self.inner.verbindungen.anzahl(),
            freie_accept_kontexte: self.inner.kontexte.anzahl(),
            akzeptiert_gesamt: self.inner.akzeptiert.load(Ordering::Relaxed),
        }
    }

    /// Admission Control des Listeners; andere Accept-Pfade (Voice-Stream)
    /// koennen dieselbe Instanz verwenden
    pub fn admission(&self) -> Arc<AdmissionControl> {
        Arc::clone(&self.inner.admission)
    }

    pub fn lokale_adressen(&self) -> Vec<SocketAddr> {
        self.inner.lokale_adressen.lock().clone()
    }

    pub fn laeuft(&self) -> bool {
        self.inner.laufend.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Accept-Loop
// ---------------------------------------------------------------------------

async fn accept_loop(
    inner: Arc<AcceptorInner>,
    listener: TcpListener,
    adresse: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            ergebnis = inner.admission.erwerben() => {
                if ergebnis.is_err() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }

        let mut kontext = inner.kontexte.holen().unwrap_or_else(|| {
            tracing::trace!(port = adresse.port(), "Accept-Kontext-Pool leer, neuer Kontext");
            AcceptKontext::neu()
        });

        let ergebnis = tokio::select! {
            r = listener.accept() => r,
            _ = shutdown_rx.changed() => {
                inner.kontexte.zurueckgeben(kontext);
                inner.admission.freigeben();
                break;
            }
        };

        match ergebnis {
            Ok((socket, peer)) => {
                kontext.abgeschlossen(socket, peer);
                if let Err(e) = inner.akzeptiert_verarbeiten(&mut kontext, &shutdown_rx) {
                    tracing::warn!(port = adresse.port(), fehler = %e, "Accept-Verarbeitung fehlgeschlagen");
                    kontext.zuruecksetzen();
                    inner.admission.freigeben();
                }
            }
            Err(e) => {
                tracing::warn!(port = adresse.port(), fehler = %e, "Accept fehlgeschlagen");
                kontext.zuruecksetzen();
                inner.admission.freigeben();
            }
        }
        inner.kontexte.zurueckgeben(kontext);
    }

    tracing::debug!(adresse = %adresse, "Accept-Loop beendet");
}

impl AcceptorInner {
    /// Bindet den Socket aus dem Kontext an eine gepoolte Verbindung
    ///
    /// Bei Fehler bleibt der Socket im Kontext; der Aufrufer schliesst ihn.
    fn akzeptiert_verarbeiten(
        self: &Arc<Self>,
        kontext: &mut AcceptKontext,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> NetzResult<()> {
        let Some(mut verbindung) = self.verbindungen.holen() else {
            return Err(NetzFehler::PoolErschoepft("verbindungen"));
        };
        let Some((socket, peer)) = kontext.entnehmen() else {
            self.verbindungen.zurueckgeben(verbindung);
            return Err(NetzFehler::PoolErschoepft("accept_kontext"));
        };

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        verbindung.aktivieren(socket, peer);
        self.akzeptiert.fetch_add(1, Ordering::Relaxed);

        let id = self.naechste_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(verbindung = id, slot = verbindung.slot(), peer = %peer, "Verbindung akzeptiert");

        let inner = Arc::clone(self);
        let shutdown_rx = shutdown_rx.clone();
        self.tasks
            .spawn(verbindung_betreiben(inner, verbindung, id, shutdown_rx));
        Ok(())
    }

    /// Schliesst den Socket, setzt die Verbindung zurueck und gibt Platz und
    /// Permit frei
    async fn trennen(&self, mut verbindung: PooledConnection, id: u64) {
        let identitaet = verbindung.identitaet;
        if let Some(mut socket) = verbindung.zuruecksetzen() {
            socket_schliessen(&mut socket, id).await;
        }
        self.verbindungen.zurueckgeben(verbindung);
        self.handler.getrennt(id, identitaet);
        self.admission.freigeben();
        tracing::debug!(verbindung = id, "Verbindung getrennt und recycelt");
    }
}

async fn socket_schliessen(socket: &mut TcpStream, id: u64) {
    match socket.shutdown().await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
        Err(e) => tracing::debug!(verbindung = id, fehler = %e, "Shutdown des Sockets fehlgeschlagen"),
    }
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

async fn verbindung_betreiben(
    inner: Arc<AcceptorInner>,
    mut verbindung: PooledConnection,
    id: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (Some(mut socket), Some(peer)) = (verbindung.socket.take(), verbindung.peer) else {
        inner.trennen(verbindung, id).await;
        return;
    };

    let (tx, mut rx) = mpsc::channel(inner.konfig.ausgangs_queue);
    let handle = ConnectionHandle::neu(id, peer, tx);
    inner.handler.verbunden(&handle);

    let grund = {
        let PooledConnection {
            empfang,
            senden,
            identitaet,
            ..
        } = &mut verbindung;
        let (mut lesen, mut schreiben) = socket.split();

        loop {
            tokio::select! {
                gelesen = lesen.read(empfang.lese_bereich()) => {
                    let n = match gelesen {
                        Ok(0) => break "Gegenstelle hat geschlossen",
                        Ok(n) => n,
                        Err(e) => {
                            tracing::debug!(verbindung = id, fehler = %e, "Lesefehler");
                            break "Lesefehler";
                        }
                    };
                    tracing::trace!(verbindung = id, bytes = n, "Bytes empfangen");

                    let handler = &inner.handler;
                    let ergebnis = empfang.bytes_empfangen(n, |frame| {
                        let mut ctx = VerbindungsKontext::neu(&handle, &mut *identitaet);
                        handler.frame_empfangen(&mut ctx, frame)
                    });
                    match ergebnis {
                        Ok(FrameAktion::Weiter) => {}
                        Ok(FrameAktion::Trennen) => break "Vom Handler getrennt",
                        Err(e) => {
                            tracing::warn!(verbindung = id, peer = %peer, fehler = %e, "Framing-Verletzung");
                            break "Framing-Verletzung";
                        }
                    }
                }

                geschrieben = schreiben.write(senden.ausstehend()), if !senden.ist_frei() => {
                    match geschrieben {
                        Ok(0) => break "Socket geschlossen",
                        Ok(n) => {
                            senden.gesendet(n);
                        }
                        Err(e) => {
                            tracing::debug!(verbindung = id, fehler = %e, "Schreibfehler");
                            break "Schreibfehler";
                        }
                    }
                }

                befehl = rx.recv(), if senden.ist_frei() => {
                    match befehl {
                        Some(Ausgehend::Nachricht(nachricht)) => {
                            if let Err(e) = senden.einreihen(&nachricht) {
                                tracing::warn!(verbindung = id, fehler = %e, "Nachricht nicht sendbar, verworfen");
                            }
                        }
                        Some(Ausgehend::Trennen(grund)) => {
                            tracing::debug!(verbindung = id, grund = %grund, "Trennen angefordert");
                            break "Trennen angefordert";
                        }
                        // Kann nicht eintreten solange `handle` lebt
                        None => break "Ausgangs-Queue geschlossen",
                    }
                }

                _ = shutdown_rx.changed() => break "Server-Shutdown",
            }
        }
    };

    tracing::debug!(verbindung = id, peer = %peer, grund, "Verbindung endet");
    drop(handle);
    verbindung.socket = Some(socket);
    inner.trennen(verbindung, id).await;
}
