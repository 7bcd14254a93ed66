//! # Máquina de Estados de una Conexión
//! src/http/connection.rs
//!
//! Una `Connection` por socket aceptado. Dueña de sus buffers, del parser
//! y del archivo mapeado mientras la respuesta está en vuelo.
//!
//! ## Ciclo
//!
//! ```text
//! read_once ──▶ process ──▶ write ──▶ (keep-alive) reset ──▶ read_once ...
//!                  │           │
//!                  │           └─ WouldBlock: Rearm(Write), se reanuda luego
//!                  └─ NoRequest: Rearm(Read), faltan bytes
//! ```
//!
//! Nunca hay dos threads sobre la misma conexión: quien la procesa la
//! posee (`Box<Connection>` dentro del work item) y la devuelve al
//! registro antes de re-armar el descriptor.

use crate::credentials::{StoreConnection, UserCache};
use crate::http::request::{HttpCode, RequestParser, READ_BUFFER_SIZE};
use crate::http::response::{BufferFull, ResponseBuffer, EMPTY_FILE_BODY};
use crate::http::StatusCode;
use crate::reactor::{Interest, TriggerMode};
use crate::router::Router;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bit de lectura para "otros" (`S_IROTH`)
const OTHER_READABLE: u32 = 0o004;

/// Datos compartidos que necesita `do_request`
#[derive(Debug)]
pub struct RequestContext {
    pub doc_root: PathBuf,
    pub router: Router,
    pub users: Arc<UserCache>,
}

impl RequestContext {
    pub fn new<P: Into<PathBuf>>(doc_root: P, users: Arc<UserCache>) -> Self {
        Self {
            doc_root: doc_root.into(),
            router: Router::with_default_pages(),
            users,
        }
    }
}

/// Qué hacer con la conexión después de un paso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Devolver al registro y re-armar con este interés
    Rearm(Interest),
    /// Cerrar el socket
    Close,
}

/// Estado de una conexión HTTP
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    trigger: TriggerMode,

    read_buf: Box<[u8; READ_BUFFER_SIZE]>,
    read_len: usize,
    parser: RequestParser,

    real_file: PathBuf,
    file: Option<Mmap>,

    write_buf: ResponseBuffer,
    bytes_to_send: usize,
    bytes_sent: usize,
    status: Option<StatusCode>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, trigger: TriggerMode) -> Self {
        Self {
            stream,
            peer,
            trigger,
            read_buf: Box::new([0u8; READ_BUFFER_SIZE]),
            read_len: 0,
            parser: RequestParser::new(),
            real_file: PathBuf::new(),
            file: None,
            write_buf: ResponseBuffer::new(),
            bytes_to_send: 0,
            bytes_sent: 0,
            status: None,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Token con el que se registra en el reactor
    pub fn token(&self) -> u64 {
        self.fd() as u64
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger
    }

    pub fn keep_alive(&self) -> bool {
        self.parser.keep_alive()
    }

    /// Status de la respuesta armada en este ciclo
    pub fn response_status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Bytes de la respuesta que faltan por enviar
    pub fn pending_bytes(&self) -> usize {
        self.bytes_to_send
    }

    pub fn real_file(&self) -> &Path {
        &self.real_file
    }

    /// Consume la conexión devolviendo el socket (para cerrarlo)
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// Lee del socket al buffer.
    ///
    /// Por nivel hace un único `read`; por flanco drena hasta
    /// `WouldBlock`. Retorna `false` si el peer cerró, hubo error o el
    /// buffer está lleno.
    pub fn read_once(&mut self) -> bool {
        if self.read_len >= READ_BUFFER_SIZE {
            return false;
        }

        loop {
            if self.read_len >= READ_BUFFER_SIZE {
                return false;
            }
            match self.stream.read(&mut self.read_buf[self.read_len..]) {
                Ok(0) => return false,
                Ok(n) => {
                    self.read_len += n;
                    if self.trigger == TriggerMode::Level {
                        return true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "read failed");
                    return false;
                }
            }
        }
    }

    /// Parsea lo leído y arma la respuesta
    pub fn process(
        &mut self,
        ctx: &RequestContext,
        store: Option<&mut dyn StoreConnection>,
    ) -> Next {
        let code = self.process_read(ctx, store);
        if code == HttpCode::NoRequest {
            return Next::Rearm(Interest::Read);
        }
        if !self.process_write(code) {
            return Next::Close;
        }
        Next::Rearm(Interest::Write)
    }

    pub fn process_read(
        &mut self,
        ctx: &RequestContext,
        store: Option<&mut dyn StoreConnection>,
    ) -> HttpCode {
        match self.parser.parse(&mut self.read_buf[..], self.read_len) {
            HttpCode::GetRequest => self.do_request(ctx, store),
            other => other,
        }
    }

    /// Resuelve el target a un archivo bajo `doc_root` y lo mapea
    pub fn do_request(
        &mut self,
        ctx: &RequestContext,
        store: Option<&mut dyn StoreConnection>,
    ) -> HttpCode {
        let form_body = self.parser.is_form().then(|| self.parser.body());
        let page = ctx
            .router
            .resolve(self.parser.target(), form_body, &ctx.users, store);

        if Path::new(&page)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return HttpCode::Forbidden;
        }
        self.real_file = ctx.doc_root.join(page.trim_start_matches('/'));

        let Ok(meta) = fs::metadata(&self.real_file) else {
            return HttpCode::NoResource;
        };
        if meta.permissions().mode() & OTHER_READABLE == 0 {
            return HttpCode::Forbidden;
        }
        if meta.is_dir() {
            return HttpCode::BadRequest;
        }

        let file = match File::open(&self.real_file) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.real_file.display(), error = %e, "open failed");
                return HttpCode::InternalError;
            }
        };
        if meta.len() == 0 {
            self.file = None;
            return HttpCode::FileRequest;
        }

        // SAFETY: el mapeo es de solo lectura; truncar el archivo mientras
        // se sirve es responsabilidad del operador del doc_root.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => {
                self.file = Some(map);
                HttpCode::FileRequest
            }
            Err(e) => {
                warn!(path = %self.real_file.display(), error = %e, "mmap failed");
                HttpCode::InternalError
            }
        }
    }

    /// Arma cabeceras (y cuerpo inline) en el buffer de escritura
    pub fn process_write(&mut self, code: HttpCode) -> bool {
        self.write_buf.clear();
        self.bytes_sent = 0;

        let assembled = match code {
            HttpCode::FileRequest => self.add_file_response(),
            HttpCode::BadRequest => self.add_error_page(StatusCode::BadRequest),
            HttpCode::NoResource => self.add_error_page(StatusCode::NotFound),
            HttpCode::Forbidden => self.add_error_page(StatusCode::Forbidden),
            HttpCode::InternalError => self.add_error_page(StatusCode::InternalServerError),
            HttpCode::NoRequest | HttpCode::GetRequest | HttpCode::ClosedConnection => {
                return false;
            }
        };

        if let Err(e) = assembled {
            warn!(peer = %self.peer, error = %e, "response assembly failed");
            self.unmap();
            return false;
        }

        self.bytes_to_send = self.write_buf.len() + self.file_bytes().len();
        true
    }

    fn add_file_response(&mut self) -> Result<(), BufferFull> {
        let keep_alive = self.parser.keep_alive();
        self.status = Some(StatusCode::Ok);
        self.write_buf.add_status_line(StatusCode::Ok)?;

        match self.file.as_ref().map(|map| map.len()) {
            Some(len) if len > 0 => self.write_buf.add_headers(len, keep_alive),
            _ => {
                self.write_buf.add_headers(EMPTY_FILE_BODY.len(), keep_alive)?;
                self.write_buf.add_content(EMPTY_FILE_BODY)
            }
        }
    }

    fn add_error_page(&mut self, status: StatusCode) -> Result<(), BufferFull> {
        let body = status.error_body().unwrap_or_default();
        self.status = Some(status);
        self.write_buf.add_status_line(status)?;
        self.write_buf.add_headers(body.len(), self.parser.keep_alive())?;
        self.write_buf.add_content(body)
    }

    /// Envía la respuesta con `writev`.
    ///
    /// `bytes_sent` conserva el progreso entre llamadas: los segmentos se
    /// recalculan desde ahí en cada intento.
    pub fn write(&mut self) -> Next {
        if self.bytes_to_send == 0 {
            self.reset();
            return Next::Rearm(Interest::Read);
        }

        loop {
            let header = self.write_buf.as_bytes();
            let body: &[u8] = self.file.as_deref().unwrap_or_default();
            let segments = pending_segments(header, body, self.bytes_sent);

            match self.stream.write_vectored(&segments) {
                Ok(0) => {
                    debug!(peer = %self.peer, "writev wrote nothing");
                    self.unmap();
                    return Next::Close;
                }
                Ok(n) => {
                    self.bytes_sent += n;
                    self.bytes_to_send = self.bytes_to_send.saturating_sub(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Next::Rearm(Interest::Write);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "writev failed");
                    self.unmap();
                    return Next::Close;
                }
            }

            if self.bytes_to_send == 0 {
                self.unmap();
                if self.parser.keep_alive() {
                    self.reset();
                    return Next::Rearm(Interest::Read);
                }
                return Next::Close;
            }
        }
    }

    /// Estado inicial para la siguiente petición
    pub fn reset(&mut self) {
        self.parser.reset();
        self.read_buf.fill(0);
        self.read_len = 0;
        self.write_buf.clear();
        self.bytes_to_send = 0;
        self.bytes_sent = 0;
        self.real_file.clear();
        self.status = None;
        self.unmap();
    }

    fn file_bytes(&self) -> &[u8] {
        self.file.as_deref().unwrap_or_default()
    }

    fn unmap(&mut self) {
        self.file = None;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("fd", &self.fd())
            .field("peer", &self.peer)
            .field("state", &self.parser.state())
            .field("read_len", &self.read_len)
            .field("bytes_to_send", &self.bytes_to_send)
            .finish()
    }
}

/// Segmentos pendientes dado lo ya enviado
fn pending_segments<'a>(header: &'a [u8], body: &'a [u8], sent: usize) -> [IoSlice<'a>; 2] {
    if sent >= header.len() {
        let offset = (sent - header.len()).min(body.len());
        [IoSlice::new(&[]), IoSlice::new(&body[offset..])]
    } else {
        [IoSlice::new(&header[sent..]), IoSlice::new(body)]
    }
}
