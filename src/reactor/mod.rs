//! # Registro de Conexiones (Reactor)
//! src/reactor/mod.rs
//!
//! Envoltorio sobre una instancia de `epoll`. Registra, re-arma y elimina
//! descriptores con modo de disparo por nivel o por flanco.
//!
//! ## Disciplina one-shot
//!
//! Las conexiones se registran con `EPOLLONESHOT`: tras entregar un evento
//! el descriptor queda deshabilitado hasta el siguiente `rearm`. Entre un
//! evento y su `rearm` la conexión tiene un único dueño.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Modo de disparo de epoll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TriggerMode {
    /// Disparo por nivel: un `recv` acotado por notificación
    #[default]
    #[value(name = "lt")]
    Level,
    /// Disparo por flanco: drenar hasta `WouldBlock`
    #[value(name = "et")]
    Edge,
}

/// Interés a re-armar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Evento de readiness reportado por `wait`
#[derive(Debug, Clone, Copy)]
pub struct Event {
    token: u64,
    flags: u32,
}

impl Event {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// El peer cerró o hubo error en el socket
    pub fn is_hangup(&self) -> bool {
        let mask = (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;
        self.flags & mask != 0
    }
}

/// Buffer de eventos reutilizable entre llamadas a `wait`
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.buf[..self.len].iter().map(|raw| {
            let raw = *raw;
            Event {
                token: raw.u64,
                flags: raw.events,
            }
        })
    }
}

/// Instancia de epoll
#[derive(Debug)]
pub struct Reactor {
    epfd: OwnedFd,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // SAFETY: epoll_create1 acaba de devolver un descriptor válido y propio
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { epfd })
    }

    /// Registra `fd` para lectura y cierre del peer. Deja el descriptor
    /// en modo no bloqueante.
    pub fn register(
        &self,
        fd: RawFd,
        token: u64,
        one_shot: bool,
        trigger: TriggerMode,
    ) -> io::Result<()> {
        set_nonblocking(fd)?;

        let mut flags = libc::EPOLLIN | libc::EPOLLRDHUP;
        if trigger == TriggerMode::Edge {
            flags |= libc::EPOLLET;
        }
        if one_shot {
            flags |= libc::EPOLLONESHOT;
        }
        self.ctl(libc::EPOLL_CTL_ADD, fd, flags as u32, token)
    }

    /// Re-suscribe `fd` con un nuevo interés, siempre one-shot
    pub fn rearm(
        &self,
        fd: RawFd,
        token: u64,
        interest: Interest,
        trigger: TriggerMode,
    ) -> io::Result<()> {
        let mut flags = match interest {
            Interest::Read => libc::EPOLLIN,
            Interest::Write => libc::EPOLLOUT,
        };
        flags |= libc::EPOLLONESHOT | libc::EPOLLRDHUP;
        if trigger == TriggerMode::Edge {
            flags |= libc::EPOLLET;
        }
        self.ctl(libc::EPOLL_CTL_MOD, fd, flags as u32, token)
    }

    /// Elimina la suscripción y cierra el socket consumiéndolo
    pub fn deregister<S: AsRawFd>(&self, socket: S) -> io::Result<()> {
        let result = self.ctl(libc::EPOLL_CTL_DEL, socket.as_raw_fd(), 0, 0);
        drop(socket);
        result
    }

    /// Espera eventos. `None` bloquea indefinidamente; una señal
    /// (`EINTR`) se reporta como cero eventos.
    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);
        let capacity = events.buf.len().min(i32::MAX as usize) as i32;

        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                events.buf.as_mut_ptr(),
                capacity,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            events.len = 0;
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        events.len = n as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags,
            u64: token,
        };
        cvt(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    const WAIT: Option<Duration> = Some(Duration::from_millis(200));

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    // ==================== Registro ====================

    #[test]
    fn test_register_reports_readable_with_token() {
        let reactor = Reactor::new().unwrap();
        let (mut client, server) = socket_pair();
        reactor
            .register(server.as_raw_fd(), 7, true, TriggerMode::Level)
            .unwrap();

        client.write_all(b"ping").unwrap();

        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 1);
        let event = events.iter().next().unwrap();
        assert_eq!(event.token(), 7);
        assert!(event.is_readable());
        assert!(!event.is_hangup());
    }

    #[test]
    fn test_one_shot_silences_until_rearm() {
        let reactor = Reactor::new().unwrap();
        let (mut client, server) = socket_pair();
        let fd = server.as_raw_fd();
        reactor.register(fd, 1, true, TriggerMode::Level).unwrap();

        client.write_all(b"a").unwrap();
        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 1);

        // Datos sin leer, pero el descriptor está deshabilitado
        client.write_all(b"b").unwrap();
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 0);

        reactor.rearm(fd, 1, Interest::Read, TriggerMode::Level).unwrap();
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 1);
    }

    #[test]
    fn test_rearm_for_write_reports_writable() {
        let reactor = Reactor::new().unwrap();
        let (_client, server) = socket_pair();
        let fd = server.as_raw_fd();
        reactor.register(fd, 3, true, TriggerMode::Edge).unwrap();

        reactor.rearm(fd, 3, Interest::Write, TriggerMode::Edge).unwrap();

        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 1);
        let event = events.iter().next().unwrap();
        assert!(event.is_writable());
        assert!(!event.is_readable());
    }

    #[test]
    fn test_peer_close_reports_hangup() {
        let reactor = Reactor::new().unwrap();
        let (client, server) = socket_pair();
        reactor
            .register(server.as_raw_fd(), 9, true, TriggerMode::Level)
            .unwrap();

        drop(client);

        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 1);
        assert!(events.iter().next().unwrap().is_hangup());
    }

    // ==================== Eliminación ====================

    #[test]
    fn test_deregister_stops_events() {
        let reactor = Reactor::new().unwrap();
        let (mut client, server) = socket_pair();
        reactor
            .register(server.as_raw_fd(), 5, false, TriggerMode::Level)
            .unwrap();

        reactor.deregister(server).unwrap();
        let _ = client.write_all(b"late");

        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, WAIT).unwrap(), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_register_sets_nonblocking() {
        let reactor = Reactor::new().unwrap();
        let (_client, mut server) = socket_pair();
        reactor
            .register(server.as_raw_fd(), 2, true, TriggerMode::Level)
            .unwrap();

        let mut buf = [0u8; 4];
        let err = std::io::Read::read(&mut server, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }
}
