//! # Tabla de Conexiones
//! src/server/table.rs
//!
//! Mapa fd → conexión. Cada slot está en uno de dos estados:
//!
//! ```text
//!   estacionada ── checkout ──▶ en vuelo ── check_in ──▶ estacionada
//!   (conn = Some)              (conn = None)
//! ```
//!
//! Una conexión en vuelo pertenece al worker (o al event loop) que la
//! tomó. El slot se conserva reservado para que el fd no se reutilice
//! mientras tanto y el barrido por inactividad la ignora.
//!
//! `check_in` y el re-armado en epoll ocurren bajo el mismo lock: el
//! evento siguiente no puede llegar antes de que la conexión esté
//! estacionada de nuevo.

use crate::http::Connection;
use crate::reactor::{Interest, Reactor};
use crate::sync::Locker;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

struct Slot {
    conn: Option<Box<Connection>>,
    last_active: Instant,
}

/// Motivo por el que no se admitió una conexión
#[derive(Debug)]
pub enum Rejected {
    /// Se alcanzó `max_connections`
    Full(Box<Connection>),
    /// epoll rechazó el registro
    Register(Box<Connection>, io::Error),
}

/// Conexiones vivas indexadas por fd
pub struct ConnectionTable {
    slots: Locker<HashMap<RawFd, Slot>>,
    max_connections: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: Locker::new(HashMap::new()),
            max_connections,
        }
    }

    /// Registra la conexión en epoll y la estaciona
    pub fn admit(&self, conn: Box<Connection>, reactor: &Reactor) -> Result<(), Rejected> {
        let mut slots = self.slots.lock();
        if slots.len() >= self.max_connections {
            return Err(Rejected::Full(conn));
        }

        if let Err(e) = reactor.register(conn.fd(), conn.token(), true, conn.trigger()) {
            return Err(Rejected::Register(conn, e));
        }
        slots.insert(
            conn.fd(),
            Slot {
                conn: Some(conn),
                last_active: Instant::now(),
            },
        );
        Ok(())
    }

    /// Toma la conexión estacionada en `fd`, dejando el slot reservado
    pub fn checkout(&self, fd: RawFd) -> Option<Box<Connection>> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&fd)?;
        let conn = slot.conn.take()?;
        slot.last_active = Instant::now();
        Some(conn)
    }

    /// Estaciona la conexión y la re-arma con `interest`.
    ///
    /// Si epoll falla (o el slot ya no existe) la conexión se devuelve
    /// para que el llamador la cierre.
    pub fn check_in(
        &self,
        conn: Box<Connection>,
        interest: Interest,
        reactor: &Reactor,
    ) -> Result<(), (Box<Connection>, io::Error)> {
        let mut slots = self.slots.lock();
        let fd = conn.fd();
        let Some(slot) = slots.get_mut(&fd) else {
            let err = io::Error::new(io::ErrorKind::NotFound, "connection slot missing");
            return Err((conn, err));
        };

        let token = conn.token();
        let trigger = conn.trigger();
        slot.conn = Some(conn);
        slot.last_active = Instant::now();

        if let Err(e) = reactor.rearm(fd, token, interest, trigger) {
            if let Some(conn) = slots.remove(&fd).and_then(|slot| slot.conn) {
                return Err((conn, e));
            }
        }
        Ok(())
    }

    /// Libera el slot de `fd`. Debe llamarse antes de cerrar el socket.
    pub fn forget(&self, fd: RawFd) {
        self.slots.lock().remove(&fd);
    }

    /// Extrae las conexiones estacionadas con más de `timeout` sin
    /// actividad. Las conexiones en vuelo no expiran.
    pub fn take_expired(&self, now: Instant, timeout: Duration) -> Vec<Box<Connection>> {
        let mut slots = self.slots.lock();
        let expired: Vec<RawFd> = slots
            .iter()
            .filter(|(_, slot)| {
                slot.conn.is_some() && now.saturating_duration_since(slot.last_active) >= timeout
            })
            .map(|(fd, _)| *fd)
            .collect();

        expired
            .into_iter()
            .filter_map(|fd| slots.remove(&fd).and_then(|slot| slot.conn))
            .collect()
    }

    /// Vacía la tabla devolviendo las conexiones estacionadas
    pub fn drain(&self) -> Vec<Box<Connection>> {
        self.slots
            .lock()
            .drain()
            .filter_map(|(_, slot)| slot.conn)
            .collect()
    }

    /// Slots ocupados (estacionadas + en vuelo)
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
