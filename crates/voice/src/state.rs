//! Endpunkt-Tabelle des Datagramm-Kanals
//!
//! Pro Spieler: UDP-Endpunkt, Zeitpunkt der letzten Aktivitaet und ob er
//! authentifiziert ist. Ein Rueckwaerts-Index Adresse -> Spieler erlaubt es,
//! den Aufrufer eines PRIO-Pakets zu bestimmen.
//!
//! Thread-safe durch DashMap.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use proxima_core::AccountId;

/// Standard-Timeout fuer inaktive Endpunkte
pub const ENDPUNKT_TIMEOUT: Duration = Duration::from_secs(45);

// ---------------------------------------------------------------------------
// VoiceEndpunkt
// ---------------------------------------------------------------------------

/// Registrierter Endpunkt eines Spielers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceEndpunkt {
    pub account_id: AccountId,
    pub adresse: SocketAddr,
    pub letzte_aktivitaet: Instant,
    pub authentifiziert: bool,
}

impl VoiceEndpunkt {
    pub fn ist_inaktiv(&self, jetzt: Instant, timeout: Duration) -> bool {
        jetzt.saturating_duration_since(self.letzte_aktivitaet) > timeout
    }
}

// ---------------------------------------------------------------------------
// EndpunktTabelle
// ---------------------------------------------------------------------------

/// Alle Endpunkte des Datagramm-Kanals
///
/// Clone teilt den inneren Zustand (Arc).
#[derive(Clone, Default)]
pub struct EndpunktTabelle {
    inner: Arc<EndpunktTabelleInner>,
}

#[derive(Default)]
struct EndpunktTabelleInner {
    endpunkte: DashMap<AccountId, VoiceEndpunkt>,
    adress_index: DashMap<SocketAddr, AccountId>,
}

impl EndpunktTabelle {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert einen authentifizierten Endpunkt
    ///
    /// Ersetzt einen frueheren Endpunkt desselben Spielers. Gehoerte die
    /// Adresse zuvor einem anderen Spieler, verliert dieser seinen Eintrag.
    pub fn registrieren(&self, account_id: AccountId, adresse: SocketAddr) -> Option<VoiceEndpunkt> {
        let neu = VoiceEndpunkt {
            account_id,
            adresse,
            letzte_aktivitaet: Instant::now(),
            authentifiziert: true,
        };

        let alt = self.inner.endpunkte.insert(account_id, neu);
        if let Some(alt) = &alt {
            if alt.adresse != adresse {
                self.inner
                    .adress_index
                    .remove_if(&alt.adresse, |_, a| *a == account_id);
            }
        }

        if let Some(vorbesitzer) = self.inner.adress_index.insert(adresse, account_id) {
            if vorbesitzer != account_id {
                self.inner
                    .endpunkte
                    .remove_if(&vorbesitzer, |_, e| e.adresse == adresse);
                tracing::debug!(
                    account = %vorbesitzer,
                    endpunkt = %adresse,
                    "Endpunkt von anderem Spieler uebernommen"
                );
            }
        }

        tracing::info!(account = %account_id, endpunkt = %adresse, ersetzt = alt.is_some(), "Voice-Endpunkt registriert");
        alt
    }

    /// Entfernt einen Spieler und bereinigt den Index
    pub fn entfernen(&self, account_id: AccountId) -> Option<VoiceEndpunkt> {
        let (_, endpunkt) = self.inner.endpunkte.remove(&account_id)?;
        self.inner
            .adress_index
            .remove_if(&endpunkt.adresse, |_, a| *a == account_id);
        Some(endpunkt)
    }

    pub fn endpunkt(&self, account_id: AccountId) -> Option<VoiceEndpunkt> {
        self.inner.endpunkte.get(&account_id).map(|e| *e)
    }

    /// Spieler hinter einer Adresse (Rueckwaerts-Index)
    pub fn account_von_adresse(&self, adresse: &SocketAddr) -> Option<AccountId> {
        self.inner.adress_index.get(adresse).map(|a| *a)
    }

    pub fn ist_authentifiziert(&self, account_id: AccountId) -> bool {
        self.inner
            .endpunkte
            .get(&account_id)
            .is_some_and(|e| e.authentifiziert)
    }

    /// Frischt den Aktivitaets-Zeitstempel auf
    pub fn aktivitaet_auffrischen(&self, account_id: AccountId) -> bool {
        match self.inner.endpunkte.get_mut(&account_id) {
            Some(mut e) => {
                e.letzte_aktivitaet = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Entfernt alle Endpunkte ohne Aktivitaet seit `timeout`
    pub fn inaktive_bereinigen(&self, timeout: Duration) -> Vec<AccountId> {
        self.inaktive_bereinigen_zum(Instant::now(), timeout)
    }

    /// Wie [`Self::inaktive_bereinigen`], mit explizitem Zeitpunkt
    pub fn inaktive_bereinigen_zum(&self, jetzt: Instant, timeout: Duration) -> Vec<AccountId> {
        let kandidaten: Vec<AccountId> = self
            .inner
            .endpunkte
            .iter()
            .filter(|e| e.ist_inaktiv(jetzt, timeout))
            .map(|e| e.account_id)
            .collect();

        let mut entfernt = Vec::with_capacity(kandidaten.len());
        for account_id in kandidaten {
            // Zwischenzeitlich aufgefrischte Endpunkte bleiben
            let weg = self
                .inner
                .endpunkte
                .remove_if(&account_id, |_, e| e.ist_inaktiv(jetzt, timeout));
            if let Some((_, endpunkt)) = weg {
                self.inner
                    .adress_index
                    .remove_if(&endpunkt.adresse, |_, a| *a == account_id);
                tracing::info!(account = %account_id, "Inaktiver Voice-Endpunkt entfernt (Timeout)");
                entfernt.push(account_id);
            }
        }
        entfernt
    }

    pub fn anzahl(&self) -> usize {
        self.inner.endpunkte.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpunkt(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn registrieren_und_abfragen() {
        let tabelle = EndpunktTabelle::neu();
        assert!(tabelle.registrieren(AccountId(1), endpunkt(10000)).is_none());

        assert!(tabelle.ist_authentifiziert(AccountId(1)));
        assert_eq!(tabelle.account_von_adresse(&endpunkt(10000)), Some(AccountId(1)));
        assert_eq!(tabelle.endpunkt(AccountId(1)).unwrap().adresse, endpunkt(10000));
        assert_eq!(tabelle.anzahl(), 1);
    }

    #[test]
    fn neuanmeldung_ersetzt_endpunkt() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(AccountId(1), endpunkt(10001));
        let alt = tabelle.registrieren(AccountId(1), endpunkt(10002));

        assert_eq!(alt.unwrap().adresse, endpunkt(10001));
        assert_eq!(tabelle.anzahl(), 1);
        assert!(tabelle.account_von_adresse(&endpunkt(10001)).is_none());
        assert_eq!(tabelle.account_von_adresse(&endpunkt(10002)), Some(AccountId(1)));
    }

    #[test]
    fn adresse_wechselt_den_besitzer() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(AccountId(1), endpunkt(10003));
        tabelle.registrieren(AccountId(2), endpunkt(10003));

        assert!(tabelle.endpunkt(AccountId(1)).is_none());
        assert_eq!(tabelle.account_von_adresse(&endpunkt(10003)), Some(AccountId(2)));
    }

    #[test]
    fn entfernen_bereinigt_index() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(AccountId(1), endpunkt(10004));
        assert!(tabelle.entfernen(AccountId(1)).is_some());
        assert!(!tabelle.ist_authentifiziert(AccountId(1)));
        assert!(tabelle.account_von_adresse(&endpunkt(10004)).is_none());
        assert!(tabelle.entfernen(AccountId(1)).is_none());
    }

    #[test]
    fn inaktive_nach_45_sekunden_entfernt() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(AccountId(1), endpunkt(10005));
        tabelle.registrieren(AccountId(2), endpunkt(10006));

        let jetzt = Instant::now();
        assert!(tabelle.inaktive_bereinigen_zum(jetzt + Duration::from_secs(30), ENDPUNKT_TIMEOUT).is_empty());

        let entfernt = tabelle.inaktive_bereinigen_zum(jetzt + Duration::from_secs(46), ENDPUNKT_TIMEOUT);
        assert_eq!(entfernt.len(), 2);
        assert_eq!(tabelle.anzahl(), 0);
        assert!(tabelle.account_von_adresse(&endpunkt(10005)).is_none());
        assert!(!tabelle.ist_authentifiziert(AccountId(2)));
    }

    #[test]
    fn auffrischen_verhindert_bereinigung() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(AccountId(1), endpunkt(10007));
        let start = Instant::now();
        assert!(tabelle.aktivitaet_auffrischen(AccountId(1)));
        assert!(!tabelle.aktivitaet_auffrischen(AccountId(9)));

        let letzte = tabelle.endpunkt(AccountId(1)).unwrap().letzte_aktivitaet;
        assert!(letzte >= start);
        assert!(tabelle
            .inaktive_bereinigen_zum(letzte + Duration::from_secs(44), ENDPUNKT_TIMEOUT)
            .is_empty());
    }

    #[test]
    fn clone_teilt_inneren_zustand() {
        let a = EndpunktTabelle::neu();
        let b = a.clone();
        a.registrieren(AccountId(3), endpunkt(10008));
        assert!(b.ist_authentifiziert(AccountId(3)));
    }
}
