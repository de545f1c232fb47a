//! Integration-Tests fuer den Voice-Stream-Kanal (Loopback-TCP)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use proxima_core::{
    AccountId, InMemoryAccountRegistry, InMemorySessionRegistry, Konto, Position, VoiceZusteller,
    WorldId,
};
use proxima_net::AdmissionControl;
use proxima_protocol::VoiceStreamCodec;
use proxima_voice::{
    PrioritySettingsRegistry, StreamKonfiguration, StreamVoiceServer, VoiceKontext,
    VoicePrioritySettings, Zustellung,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, VoiceStreamCodec>;

const WELT: WorldId = WorldId(1);

struct Umgebung {
    server: StreamVoiceServer,
    kontext: Arc<VoiceKontext>,
    sitzungen: InMemorySessionRegistry,
    konten: InMemoryAccountRegistry,
    adresse: SocketAddr,
    admission: Arc<AdmissionControl>,
    shutdown_tx: watch::Sender<bool>,
}

/// Drei Spieler: 1 bei (0,0), 2 bei (5,0), 3 bei (20,0)
async fn umgebung(zustellung: Zustellung) -> Umgebung {
    let sitzungen = InMemorySessionRegistry::neu();
    let konten = InMemoryAccountRegistry::neu();
    for (id, x) in [(1, 0.0), (2, 5.0), (3, 20.0)] {
        sitzungen.spieler_setzen(AccountId(id), Some(Position::neu(x, 0.0, WELT)));
        konten.konto_setzen(Konto::neu(AccountId(id), format!("kennung-{id}")));
    }

    let kontext = Arc::new(VoiceKontext::neu(
        Arc::new(sitzungen.clone()),
        Arc::new(konten.clone()),
        PrioritySettingsRegistry::neu(VoicePrioritySettings::default()),
        15.0,
    ));

    let mut konfig = StreamKonfiguration::neu(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    konfig.zustellung = zustellung;
    let admission = Arc::new(AdmissionControl::neu(8));
    let server = StreamVoiceServer::neu(konfig, Arc::clone(&kontext), Arc::clone(&admission));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let adresse = server.starten(shutdown_rx).await.expect("Server startet");

    Umgebung {
        server,
        kontext,
        sitzungen,
        konten,
        adresse,
        admission,
        shutdown_tx,
    }
}

async fn verbinden(adresse: SocketAddr) -> Client {
    let stream = TcpStream::connect(adresse).await.expect("Verbindung");
    Framed::new(stream, VoiceStreamCodec::new())
}

async fn anmelden(u: &Umgebung, id: i32) -> Client {
    let mut client = verbinden(u.adresse).await;
    client
        .send(format!("VOICE_CONNECT:{id}:kennung-{id}"))
        .await
        .unwrap();
    warten_bis(|| u.server.hat_sitzung(AccountId(id))).await;
    client
}

async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht rechtzeitig erfuellt");
}

fn voice_data(player_id: i32) -> String {
    format!(
        r#"VOICE_DATA:{{"PlayerId":"{player_id}","PlayerName":"Spieler{player_id}","AudioData":"AQID","Volume":1.0,"X":0,"Y":0}}"#
    )
}

async fn naechste_nachricht(client: &mut Client) -> serde_json::Value {
    let text = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Nachricht erwartet")
        .expect("Verbindung offen")
        .expect("gueltiger Frame");
    serde_json::from_str(&text).expect("JSON")
}

async fn nichts_empfangen(client: &mut Client) {
    let ergebnis = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(ergebnis.is_err(), "keine Nachricht erwartet: {ergebnis:?}");
}

async fn wird_geschlossen(client: &mut Client) {
    let ende = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Server muss schliessen");
    assert!(ende.is_none() || matches!(ende, Some(Err(_))));
}

#[tokio::test]
async fn audio_erreicht_nur_spieler_in_reichweite() {
    let u = umgebung(Zustellung::Stream).await;
    let mut a = anmelden(&u, 1).await;
    let mut b = anmelden(&u, 2).await;
    let mut c = anmelden(&u, 3).await;

    a.send(voice_data(1)).await.unwrap();

    let nachricht = naechste_nachricht(&mut b).await;
    assert_eq!(nachricht["PacketType"], "PROXIMITY_VOICE");
    assert_eq!(nachricht["PlayerId"], "1");
    assert_eq!(nachricht["PlayerName"], "Spieler1");
    assert_eq!(nachricht["AudioData"], "AQID");
    let volume = nachricht["Volume"].as_f64().unwrap();
    assert!((volume - 2.0 / 3.0).abs() < 1e-3, "Volume {volume}");
    assert!((nachricht["Distance"].as_f64().unwrap() - 5.0).abs() < 1e-3);
    assert!(nachricht["Timestamp"].as_i64().unwrap() > 0);

    // Spieler 3 ist 20 Einheiten entfernt, der Sprecher hoert sich nicht selbst
    nichts_empfangen(&mut c).await;
    nichts_empfangen(&mut a).await;
}

#[tokio::test]
async fn falsche_kennung_schliesst_ohne_registrierung() {
    let u = umgebung(Zustellung::Stream).await;
    let mut client = verbinden(u.adresse).await;
    client.send("VOICE_CONNECT:1:falsch".to_string()).await.unwrap();

    wird_geschlossen(&mut client).await;
    assert!(!u.server.hat_sitzung(AccountId(1)));
    // Permit zurueck; das verbleibende haelt die wartende Accept-Loop
    warten_bis(|| u.admission.aktive() == 1).await;
}

#[tokio::test]
async fn anmeldung_ohne_kennung_schliesst() {
    let u = umgebung(Zustellung::Stream).await;
    let mut client = verbinden(u.adresse).await;
    client.send("VOICE_CONNECT:1".to_string()).await.unwrap();

    wird_geschlossen(&mut client).await;
    assert_eq!(u.server.sitzungs_anzahl(), 0);
}

#[tokio::test]
async fn spieler_ohne_welt_wird_abgelehnt() {
    let u = umgebung(Zustellung::Stream).await;
    u.sitzungen.position_setzen(AccountId(1), None);

    let mut client = verbinden(u.adresse).await;
    client.send("VOICE_CONNECT:1:kennung-1".to_string()).await.unwrap();
    wird_geschlossen(&mut client).await;
}

#[tokio::test]
async fn unbekannte_nachrichten_werden_ignoriert() {
    let u = umgebung(Zustellung::Stream).await;
    let mut a = anmelden(&u, 1).await;
    let mut b = anmelden(&u, 2).await;

    a.send("HALLO".to_string()).await.unwrap();
    a.send("VOICE_DATA:{kaputt".to_string()).await.unwrap();
    a.send(voice_data(1)).await.unwrap();

    // Verbindung lebt noch und Audio kommt an
    let nachricht = naechste_nachricht(&mut b).await;
    assert_eq!(nachricht["PlayerId"], "1");
}

#[tokio::test]
async fn erneute_anmeldung_ersetzt_alte_sitzung() {
    let u = umgebung(Zustellung::Stream).await;
    let mut alt = anmelden(&u, 2).await;

    let mut neu = verbinden(u.adresse).await;
    neu.send("VOICE_CONNECT:2:kennung-2".to_string()).await.unwrap();

    wird_geschlossen(&mut alt).await;
    assert_eq!(u.server.sitzungs_anzahl(), 1);

    // Audio landet auf der neuen Verbindung
    let mut a = anmelden(&u, 1).await;
    a.send(voice_data(1)).await.unwrap();
    let nachricht = naechste_nachricht(&mut neu).await;
    assert_eq!(nachricht["PlayerId"], "1");
}

#[tokio::test]
async fn gegenseitiges_ignorieren_unterdrueckt_audio() {
    let u = umgebung(Zustellung::Stream).await;
    u.konten
        .konto_aktualisieren(AccountId(2), |k| {
            k.ignore_liste.insert(AccountId(1));
        });

    let mut a = anmelden(&u, 1).await;
    let mut b = anmelden(&u, 2).await;

    // B ignoriert A: A -> B wird unterdrueckt
    a.send(voice_data(1)).await.unwrap();
    nichts_empfangen(&mut b).await;

    // und ebenso B -> A
    b.send(voice_data(2)).await.unwrap();
    nichts_empfangen(&mut a).await;
}

#[tokio::test]
async fn fremde_spieler_id_wird_ignoriert() {
    let u = umgebung(Zustellung::Stream).await;
    let mut a = anmelden(&u, 1).await;
    let mut b = anmelden(&u, 2).await;

    // Verbindung ist an Spieler 1 gebunden und sendet als Spieler 3
    a.send(voice_data(3)).await.unwrap();
    nichts_empfangen(&mut b).await;
    assert!(!u.server.hat_sitzung(AccountId(3)));
}

#[tokio::test]
async fn prioritaets_einstellung_aendert_welt() {
    let u = umgebung(Zustellung::Stream).await;
    let mut a = anmelden(&u, 1).await;

    a.send("PRIORITY_SETTING:ENABLED:true".to_string()).await.unwrap();
    a.send("PRIORITY_SETTING:THRESHOLD:3".to_string()).await.unwrap();
    a.send("PRIORITY_SETTING:THRESHOLD:viele".to_string()).await.unwrap();
    a.send("PRIORITY_SETTING:ADD_MANUAL:2".to_string()).await.unwrap();

    let prioritaet = u.kontext.prioritaet().clone();
    warten_bis(|| prioritaet.schnappschuss(WELT).manuell() == [AccountId(2)]).await;

    let settings = prioritaet.schnappschuss(WELT);
    assert!(settings.aktiviert);
    assert_eq!(settings.schwelle, 3);
}

#[tokio::test]
async fn prioritaet_ohne_anmeldung_wird_ignoriert() {
    let u = umgebung(Zustellung::Stream).await;
    let mut client = verbinden(u.adresse).await;
    client
        .send("PRIORITY_SETTING:ENABLED:true".to_string())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!u.kontext.prioritaet().schnappschuss(WELT).aktiviert);
    assert_eq!(u.kontext.prioritaet().anzahl_welten(), 0);
}

// ---------------------------------------------------------------------------
// Zustellung ueber die Spielverbindung
// ---------------------------------------------------------------------------

struct KanalZusteller(mpsc::UnboundedSender<String>);

impl VoiceZusteller for KanalZusteller {
    fn zustellen(&self, json: &str) -> bool {
        self.0.send(json.to_string()).is_ok()
    }
}

#[tokio::test]
async fn zustellung_ueber_spielverbindung() {
    let u = umgebung(Zustellung::Spiel).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(u.sitzungen.zusteller_setzen(AccountId(2), Arc::new(KanalZusteller(tx))));

    let mut a = anmelden(&u, 1).await;
    a.send(voice_data(1)).await.unwrap();

    let json = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Zustellung erwartet")
        .expect("Kanal offen");
    let nachricht: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(nachricht["PlayerId"], "1");
    assert_eq!(nachricht["PacketType"], "PROXIMITY_VOICE");
}

#[tokio::test]
async fn shutdown_beendet_alle_verbindungen() {
    let u = umgebung(Zustellung::Stream).await;
    let mut a = anmelden(&u, 1).await;

    u.shutdown_tx.send(true).unwrap();
    wird_geschlossen(&mut a).await;

    tokio::time::timeout(Duration::from_secs(2), u.server.beendet())
        .await
        .expect("Server beendet");
    assert_eq!(u.admission.aktive(), 0);
    assert_eq!(u.server.sitzungs_anzahl(), 0);
}
