//! # Contexto Compartido
//! src/server/context.rs
//!
//! Todo lo que el event loop y los workers comparten: el reactor, la
//! tabla de conexiones, el contexto de peticiones, el pool del almacén y
//! las métricas.

use super::table::ConnectionTable;
use crate::credentials::ConnectionPool;
use crate::http::{Connection, Next, RequestContext};
use crate::metrics::MetricsCollector;
use crate::reactor::Reactor;
use tracing::debug;

pub struct ServeContext {
    pub reactor: Reactor,
    pub table: ConnectionTable,
    pub request: RequestContext,
    pub store: ConnectionPool,
    pub metrics: MetricsCollector,
}

impl ServeContext {
    /// Aplica el veredicto de un paso sobre la conexión
    pub fn finish(&self, conn: Box<Connection>, next: Next) {
        match next {
            Next::Rearm(interest) => {
                if let Err((conn, e)) = self.table.check_in(conn, interest, &self.reactor) {
                    debug!(peer = %conn.peer(), error = %e, "rearm failed");
                    self.close(conn);
                }
            }
            Next::Close => self.close(conn),
        }
    }

    /// Libera el slot, quita el fd de epoll y cierra el socket.
    ///
    /// El slot se libera antes de cerrar: mientras el fd siga abierto el
    /// kernel no lo reutiliza para otra conexión.
    pub fn close(&self, conn: Box<Connection>) {
        let fd = conn.fd();
        let peer = conn.peer();
        self.table.forget(fd);

        if let Err(e) = self.reactor.deregister(conn.into_stream()) {
            debug!(fd, error = %e, "epoll del failed");
        }
        self.metrics.connection_closed();
        debug!(%peer, "connection closed");
    }
}
