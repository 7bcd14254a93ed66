//! # Event Loop TCP
//! src/server/tcp.rs
//!
//! Un único thread espera eventos en epoll y reparte el trabajo:
//!
//! ```text
//!                 ┌──────────────┐
//!   listener ───▶ │   accept     │──▶ ConnectionTable::admit
//!                 └──────────────┘
//!   EPOLLIN  ───▶ checkout ──▶ (direct: read_once) ──▶ WorkerPool::submit
//!   EPOLLOUT ───▶ checkout ──▶ (direct: write | dual: submit)
//!   HUP/ERR  ───▶ checkout ──▶ close
//!   tick     ───▶ barrido de conexiones inactivas
//! ```
//!
//! SIGINT y SIGTERM encienden una bandera que el loop revisa en cada
//! vuelta; al detenerse se apaga el pool y se cierran las conexiones.

use super::context::ServeContext;
use super::table::{ConnectionTable, Rejected};
use crate::config::Config;
use crate::credentials::{ConnectionPool, StoreConnection, UserCache};
use crate::error::ServerError;
use crate::http::{Connection, RequestContext};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::pool::{DispatchMode, Dispatcher, PoolConfig, WorkItem, WorkerPool};
use crate::reactor::{Events, Reactor, TriggerMode};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Token del socket de escucha (los fds nunca llegan a este valor)
pub const LISTENER_TOKEN: u64 = u64::MAX;

/// Respuesta a un cliente cuando la tabla está llena
pub const BUSY_MESSAGE: &[u8] = b"Internal server busy";

const MAX_EVENTS: usize = 10_000;

/// Cada cuánto despierta `wait` para revisar la bandera de parada
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cada cuánto se barren conexiones inactivas
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

static SIGNALED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop_signal(_sig: libc::c_int) {
    SIGNALED.store(true, Ordering::SeqCst);
}

/// Instala los handlers de SIGINT/SIGTERM e ignora SIGPIPE
pub fn install_signal_handlers() -> Result<(), ServerError> {
    let results = unsafe {
        [
            libc::signal(libc::SIGINT, handle_stop_signal as usize),
            libc::signal(libc::SIGTERM, handle_stop_signal as usize),
            libc::signal(libc::SIGPIPE, libc::SIG_IGN),
        ]
    };
    if results.contains(&libc::SIG_ERR) {
        return Err(ServerError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Servidor HTTP basado en reactor
pub struct Server {
    config: Config,
    listener: TcpListener,
    ctx: Arc<ServeContext>,
    pool: WorkerPool<WorkItem>,
    stop: Arc<AtomicBool>,
}

impl Server {
    /// Abre el almacén, carga usuarios, crea epoll, hace bind y lanza
    /// los workers. Cualquier fallo aquí es fatal.
    pub fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let store = ConnectionPool::open_json(&config.users_file, config.store_pool_size)?;
        let users = Arc::new(UserCache::new());
        {
            let mut conn = store.acquire()?;
            users.load(conn.load_users()?);
        }
        info!(users = users.len(), "credential cache loaded");

        let reactor = Reactor::new().map_err(ServerError::Reactor)?;

        let addr = config.address();
        let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        if config.linger {
            set_linger(&listener)?;
        }
        reactor
            .register(
                listener.as_raw_fd(),
                LISTENER_TOKEN,
                false,
                config.listen_trigger,
            )
            .map_err(ServerError::Reactor)?;

        let ctx = Arc::new(ServeContext {
            reactor,
            table: ConnectionTable::new(config.max_connections),
            request: RequestContext::new(config.doc_root.clone(), users),
            store,
            metrics: MetricsCollector::new(),
        });

        let dispatcher = Dispatcher::new(config.dispatch, Arc::clone(&ctx));
        let pool = WorkerPool::new(
            PoolConfig {
                threads: config.threads,
                max_requests: config.max_requests,
            },
            move |item| dispatcher.handle(item),
        )?;

        Ok(Self {
            config,
            listener,
            ctx,
            pool,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Bandera que detiene `run` al ponerse en `true`
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.ctx.metrics.clone()
    }

    /// Ejecuta el event loop hasta recibir la señal de parada
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            dispatch = ?self.config.dispatch,
            listen_trigger = ?self.config.listen_trigger,
            conn_trigger = ?self.config.conn_trigger,
            threads = self.pool.threads(),
            "server listening"
        );

        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut last_sweep = Instant::now();

        let result = loop {
            if self.should_stop() {
                break Ok(());
            }

            if let Err(e) = self.ctx.reactor.wait(&mut events, Some(POLL_INTERVAL)) {
                error!(error = %e, "epoll wait failed");
                break Err(ServerError::Reactor(e));
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept();
                    continue;
                }

                let fd = event.token() as RawFd;
                if event.is_hangup() {
                    if let Some(conn) = self.ctx.table.checkout(fd) {
                        debug!(peer = %conn.peer(), "peer hung up");
                        self.ctx.close(conn);
                    }
                } else if event.is_readable() {
                    self.on_readable(fd);
                } else if event.is_writable() {
                    self.on_writable(fd);
                }
            }

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.sweep_idle();
                last_sweep = Instant::now();
            }
        };

        let snapshot = self.shutdown();
        info!(
            accepted = snapshot.connections_accepted,
            closed = snapshot.connections_closed,
            responses = snapshot.total_responses,
            queue_rejected = snapshot.queue_rejected,
            idle_timeouts = snapshot.idle_timeouts,
            "server stopped"
        );
        debug!(metrics = %self.ctx.metrics.to_json(), "final metrics");
        result
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || SIGNALED.load(Ordering::SeqCst)
    }

    /// Acepta una conexión por evento en modo nivel; en modo flanco
    /// acepta hasta `WouldBlock`
    fn accept(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.admit(stream, peer);
                    if self.config.listen_trigger == TriggerMode::Level {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let conn = Box::new(Connection::new(stream, peer, self.config.conn_trigger));

        match self.ctx.table.admit(conn, &self.ctx.reactor) {
            Ok(()) => {
                self.ctx.metrics.connection_accepted();
                debug!(%peer, "connection accepted");
            }
            Err(Rejected::Full(conn)) => {
                warn!(%peer, max = self.ctx.table.max_connections(), "connection table full");
                self.ctx.metrics.connection_refused();
                let mut stream = conn.into_stream();
                if let Err(e) = stream.write_all(BUSY_MESSAGE) {
                    debug!(%peer, error = %e, "busy reply failed");
                }
            }
            Err(Rejected::Register(_conn, e)) => {
                warn!(%peer, error = %e, "epoll registration failed");
            }
        }
    }

    fn on_readable(&self, fd: RawFd) {
        let Some(mut conn) = self.ctx.table.checkout(fd) else {
            debug!(fd, "readable event for unknown connection");
            return;
        };

        match self.config.dispatch {
            DispatchMode::Direct => {
                if conn.read_once() {
                    self.submit(WorkItem::Read(conn));
                } else {
                    debug!(peer = %conn.peer(), "peer closed or read failed");
                    self.ctx.close(conn);
                }
            }
            DispatchMode::Dual => self.submit(WorkItem::Read(conn)),
        }
    }

    fn on_writable(&self, fd: RawFd) {
        let Some(mut conn) = self.ctx.table.checkout(fd) else {
            debug!(fd, "writable event for unknown connection");
            return;
        };

        match self.config.dispatch {
            DispatchMode::Direct => {
                let next = conn.write();
                self.ctx.finish(conn, next);
            }
            DispatchMode::Dual => self.submit(WorkItem::Write(conn)),
        }
    }

    fn submit(&self, item: WorkItem) {
        if let Err(item) = self.pool.submit(item) {
            let conn = item.into_connection();
            warn!(
                peer = %conn.peer(),
                pending = self.pool.pending(),
                "work queue full, dropping connection"
            );
            self.ctx.metrics.queue_rejected();
            self.ctx.close(conn);
        }
    }

    fn sweep_idle(&self) {
        let timeout = Duration::from_secs(self.config.idle_timeout_secs);
        for conn in self.ctx.table.take_expired(Instant::now(), timeout) {
            info!(peer = %conn.peer(), "closing idle connection");
            self.ctx.metrics.idle_timeout();
            self.ctx.close(conn);
        }
    }

    /// Apaga workers y almacén y cierra lo que quede en la tabla
    fn shutdown(&mut self) -> MetricsSnapshot {
        info!("shutting down");
        // Los workers bloqueados en `acquire` deben poder salir
        self.ctx.store.close();
        self.pool.shutdown();

        for conn in self.ctx.table.drain() {
            self.ctx.close(conn);
        }
        self.ctx.metrics.snapshot()
    }
}

/// `SO_LINGER` con un segundo de espera al cerrar
fn set_linger(listener: &TcpListener) -> Result<(), ServerError> {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 1,
    };
    let ret = unsafe {
        libc::setsockopt(
            listener.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(ServerError::Io(io::Error::last_os_error()));
    }
    Ok(())
}
