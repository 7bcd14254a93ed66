//! # Despacho de Trabajos
//! src/pool/dispatch.rs
//!
//! Qué hace un worker con una conexión según el modo de concurrencia:
//!
//! - **direct**: el event loop ya leyó del socket; el worker parsea,
//!   arma la respuesta y la escribe en el mismo paso.
//! - **dual**: el worker hace también la E/S. Una lectura se procesa en
//!   `handle_read` y una escritura pendiente en `handle_write`.

use crate::credentials::StoreConnection;
use crate::http::{Connection, Next};
use crate::reactor::Interest;
use crate::server::ServeContext;
use std::sync::Arc;
use tracing::{debug, warn};

/// Modo de concurrencia
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DispatchMode {
    /// El event loop hace la E/S y los workers la lógica
    #[default]
    Direct,
    /// Los workers hacen la E/S y la lógica
    Dual,
}

/// Trabajo encolado en el pool
#[derive(Debug)]
pub enum WorkItem {
    Read(Box<Connection>),
    Write(Box<Connection>),
}

impl WorkItem {
    pub fn into_connection(self) -> Box<Connection> {
        match self {
            Self::Read(conn) | Self::Write(conn) => conn,
        }
    }
}

/// Handler de los workers
pub struct Dispatcher {
    mode: DispatchMode,
    ctx: Arc<ServeContext>,
}

impl Dispatcher {
    pub fn new(mode: DispatchMode, ctx: Arc<ServeContext>) -> Self {
        Self { mode, ctx }
    }

    pub fn handle(&self, item: WorkItem) {
        match (self.mode, item) {
            (DispatchMode::Direct, item) => self.handle_direct(item.into_connection()),
            (DispatchMode::Dual, WorkItem::Read(conn)) => self.handle_read(conn),
            (DispatchMode::Dual, WorkItem::Write(conn)) => self.handle_write(conn),
        }
    }

    fn handle_direct(&self, mut conn: Box<Connection>) {
        let mut next = self.serve_request(&mut conn);
        if next == Next::Rearm(Interest::Write) {
            next = conn.write();
        }
        self.ctx.finish(conn, next);
    }

    /// Lee, procesa y re-arma
    pub fn handle_read(&self, mut conn: Box<Connection>) {
        if !conn.read_once() {
            debug!(peer = %conn.peer(), "peer closed or read failed");
            self.ctx.close(conn);
            return;
        }
        let next = self.serve_request(&mut conn);
        self.ctx.finish(conn, next);
    }

    /// Continúa el envío de la respuesta
    pub fn handle_write(&self, mut conn: Box<Connection>) {
        let next = conn.write();
        self.ctx.finish(conn, next);
    }

    /// Procesa lo leído con una conexión del almacén prestada
    fn serve_request(&self, conn: &mut Connection) -> Next {
        let mut guard = match self.ctx.store.acquire() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "no credential connection available");
                None
            }
        };
        let store = guard.as_mut().map(|g| g as &mut dyn StoreConnection);
        let next = conn.process(&self.ctx.request, store);
        drop(guard);

        if next == Next::Rearm(Interest::Write) {
            if let Some(status) = conn.response_status() {
                if status.is_server_error() {
                    warn!(peer = %conn.peer(), status = %status, "request failed");
                } else if status.is_client_error() {
                    debug!(peer = %conn.peer(), status = %status, "request rejected");
                }
                self.ctx
                    .metrics
                    .record_response(status.as_u16(), conn.pending_bytes());
            }
        }
        next
    }
}
