//! AdmissionControl – Obergrenze gleichzeitig aktiver Verbindungen
//!
//! Zaehlendes Permit auf Basis von `tokio::sync::Semaphore`. Permits werden
//! nicht als Guard gehalten, sondern beim Trennen explizit freigegeben, da
//! Erwerb (Accept-Loop) und Freigabe (Verbindungs-Task) in verschiedenen
//! Tasks stattfinden.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::error::{NetzFehler, NetzResult};

/// Zaehlendes Permit fuer den Listener
#[derive(Debug)]
pub struct AdmissionControl {
    semaphore: Semaphore,
    kapazitaet: usize,
    /// Anzahl vergebener, noch nicht freigegebener Permits
    ausgegeben: AtomicUsize,
}

impl AdmissionControl {
    pub fn neu(kapazitaet: usize) -> Self {
        Self {
            semaphore: Semaphore::new(kapazitaet),
            kapazitaet,
            ausgegeben: AtomicUsize::new(0),
        }
    }

    /// Wartet bis ein Permit frei ist
    ///
    /// Einzige blockierende Stelle im Accept-Pfad.
    pub async fn erwerben(&self) -> NetzResult<()> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| NetzFehler::AdmissionGeschlossen)?;
        permit.forget();
        self.ausgegeben.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Gibt ein Permit zurueck
    ///
    /// Eine Freigabe ohne vorherigen Erwerb wird geloggt und ignoriert;
    /// dann wird `false` geliefert.
    pub fn freigeben(&self) -> bool {
        let ergebnis = self
            .ausgegeben
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match ergebnis {
            Ok(_) => {
                self.semaphore.add_permits(1);
                true
            }
            Err(_) => {
                tracing::error!(
                    kapazitaet = self.kapazitaet,
                    "Admission-Permit freigegeben, das nicht vergeben war"
                );
                false
            }
        }
    }

    /// Weckt alle Wartenden mit `AdmissionGeschlossen`
    pub fn schliessen(&self) {
        self.semaphore.close();
    }

    /// Anzahl aktuell vergebener Permits
    pub fn aktive(&self) -> usize {
        self.ausgegeben.load(Ordering::Acquire)
    }

    pub fn verfuegbar(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn erwerben_bis_kapazitaet() {
        let ac = AdmissionControl::neu(2);
        ac.erwerben().await.unwrap();
        ac.erwerben().await.unwrap();
        assert_eq!(ac.aktive(), 2);
        assert_eq!(ac.verfuegbar(), 0);

        // Drittes Permit muss warten
        let blockiert = tokio::time::timeout(Duration::from_millis(50), ac.erwerben()).await;
        assert!(blockiert.is_err());
    }

    #[tokio::test]
    async fn freigabe_weckt_wartenden() {
        let ac = Arc::new(AdmissionControl::neu(1));
        ac.erwerben().await.unwrap();

        let ac2 = Arc::clone(&ac);
        let wartend = tokio::spawn(async move { ac2.erwerben().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!wartend.is_finished());

        assert!(ac.freigeben());
        wartend.await.unwrap().unwrap();
        assert_eq!(ac.aktive(), 1);
    }

    #[tokio::test]
    async fn doppelte_freigabe_ist_nicht_fatal() {
        let ac = AdmissionControl::neu(1);
        ac.erwerben().await.unwrap();
        assert!(ac.freigeben());
        assert!(!ac.freigeben());
        // Kapazitaet bleibt unveraendert
        assert_eq!(ac.verfuegbar(), 1);
        assert_eq!(ac.aktive(), 0);
    }

    #[tokio::test]
    async fn schliessen_beendet_wartende() {
        let ac = AdmissionControl::neu(0);
        ac.schliessen();
        assert!(matches!(ac.erwerben().await, Err(NetzFehler::AdmissionGeschlossen)));
    }
}
