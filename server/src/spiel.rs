//! Bruecke zwischen Spielverbindungen und Sitzungsregister
//!
//! Die Spiellogik selbst liegt ausserhalb dieses Repositories und wird als
//! [`FrameHandler`] eingehaengt. Die Bruecke reicht alle Ereignisse an sie
//! weiter und haengt, sobald die Spiellogik eine Identitaet bindet, die
//! Verbindung als [`VoiceZusteller`] an die Sitzung. Darueber laeuft der
//! spielprotokoll-integrierte Voice-Pfad.

use std::sync::Arc;

use dashmap::DashMap;
use proxima_core::{AccountId, InMemorySessionRegistry, SessionRegistry, VoiceZusteller};
use proxima_net::{ConnectionHandle, Frame, FrameAktion, FrameHandler, VerbindungsId, VerbindungsKontext};
use proxima_protocol::SpielNachricht;

// ---------------------------------------------------------------------------
// SpielZusteller
// ---------------------------------------------------------------------------

/// Stellt Proximity-Voice als Spielnachricht (0xF0) zu
pub struct SpielZusteller {
    handle: ConnectionHandle,
}

impl SpielZusteller {
    pub fn neu(handle: ConnectionHandle) -> Self {
        Self { handle }
    }
}

impl VoiceZusteller for SpielZusteller {
    fn zustellen(&self, json: &str) -> bool {
        self.handle.senden(SpielNachricht::ProximityVoice {
            json: json.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// LeereSpiellogik
// ---------------------------------------------------------------------------

/// Platzhalter, solange keine Spiellogik eingehaengt ist
///
/// Haelt Verbindungen offen und verwirft alle Frames.
pub struct LeereSpiellogik;

impl FrameHandler for LeereSpiellogik {
    fn frame_empfangen(&self, ctx: &mut VerbindungsKontext<'_>, frame: Frame<'_>) -> FrameAktion {
        tracing::trace!(
            verbindung = ctx.handle().id(),
            typ = frame.kopf.nachricht_id,
            bytes = frame.kopf.laenge,
            "Spiel-Frame ohne Spiellogik verworfen"
        );
        FrameAktion::Weiter
    }
}

// ---------------------------------------------------------------------------
// SpielBruecke
// ---------------------------------------------------------------------------

/// FrameHandler des Spiel-Listeners
pub struct SpielBruecke {
    sitzungen: InMemorySessionRegistry,
    logik: Arc<dyn FrameHandler>,
    /// Welche Verbindung eine Identitaet aktuell traegt
    gebunden: DashMap<AccountId, VerbindungsId>,
}

impl SpielBruecke {
    pub fn neu(sitzungen: InMemorySessionRegistry, logik: Arc<dyn FrameHandler>) -> Self {
        Self {
            sitzungen,
            logik,
            gebunden: DashMap::new(),
        }
    }

    fn identitaet_gebunden(&self, account_id: AccountId, handle: &ConnectionHandle) {
        self.gebunden.insert(account_id, handle.id());

        let zusteller = Arc::new(SpielZusteller::neu(handle.clone()));
        if self.sitzungen.zusteller_setzen(account_id, zusteller) {
            tracing::debug!(account = %account_id, verbindung = handle.id(), "Spielverbindung an Sitzung gehaengt");
        } else {
            tracing::debug!(account = %account_id, "Keine Sitzung fuer gebundene Spielverbindung");
        }
    }
}

impl FrameHandler for SpielBruecke {
    fn verbunden(&self, handle: &ConnectionHandle) {
        self.logik.verbunden(handle);
    }

    fn frame_empfangen(&self, ctx: &mut VerbindungsKontext<'_>, frame: Frame<'_>) -> FrameAktion {
        let vorher = ctx.identitaet();
        let aktion = self.logik.frame_empfangen(ctx, frame);

        if let Some(account_id) = ctx.identitaet() {
            if vorher != Some(account_id) {
                let handle = ctx.handle().clone();
                self.identitaet_gebunden(account_id, &handle);
            }
        }
        aktion
    }

    fn getrennt(&self, id: VerbindungsId, identitaet: Option<AccountId>) {
        if let Some(account_id) = identitaet {
            // Nur wenn keine neuere Verbindung die Identitaet uebernommen hat
            if self.gebunden.remove_if(&account_id, |_, v| *v == id).is_some() {
                if let Some(mut info) = self.sitzungen.sitzung(account_id) {
                    info.verbunden = false;
                    self.sitzungen.sitzung_setzen(info);
                }
            }
        }
        self.logik.getrennt(id, identitaet);
    }
}
