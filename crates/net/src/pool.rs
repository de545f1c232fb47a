//! Begrenzte Objekt-Pools
//!
//! Beide Pools des Acceptors (Accept-Kontexte und Verbindungen) sind ein
//! `parking_lot::Mutex<Vec<T>>` mit fester Obergrenze. Der Lock wird nur fuer
//! ein `push`/`pop` gehalten.

use parking_lot::Mutex;

use crate::connection::{AcceptKontext, PooledConnection};

/// Stapel wiederverwendbarer Objekte mit Obergrenze
#[derive(Debug)]
pub struct ObjektPool<T> {
    name: &'static str,
    kapazitaet: usize,
    objekte: Mutex<Vec<T>>,
}

impl<T> ObjektPool<T> {
    pub fn neu(name: &'static str, kapazitaet: usize) -> Self {
        Self {
            name,
            kapazitaet,
            objekte: Mutex::new(Vec::with_capacity(kapazitaet)),
        }
    }

    /// Entnimmt ein Objekt; `None` wenn der Pool leer ist
    pub fn holen(&self) -> Option<T> {
        self.objekte.lock().pop()
    }

    /// Legt ein Objekt zurueck
    ///
    /// Ist der Pool bereits voll, wird das Objekt verworfen und `false`
    /// geliefert. Der Pool waechst nie ueber seine Kapazitaet.
    pub fn zurueckgeben(&self, objekt: T) -> bool {
        let mut objekte = self.objekte.lock();
        if objekte.len() >= self.kapazitaet {
            tracing::warn!(pool = self.name, kapazitaet = self.kapazitaet, "Pool voll, Objekt verworfen");
            return false;
        }
        objekte.push(objekt);
        true
    }

    /// Entfernt alle Objekte und gibt ihre Anzahl zurueck
    pub fn leeren(&self) -> usize {
        let entfernt: Vec<T> = std::mem::take(&mut *self.objekte.lock());
        entfernt.len()
    }

    pub fn anzahl(&self) -> usize {
        self.objekte.lock().len()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}

/// Pool wiederverwendbarer Accept-Kontexte
pub type OperationPool = ObjektPool<AcceptKontext>;

/// Pool vorkonstruierter Verbindungen (Kapazitaet = max. Verbindungen + 1)
pub type ConnectionPool = ObjektPool<PooledConnection>;
