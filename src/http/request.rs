//! # Parsing Incremental de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Máquina de estados que consume el buffer de lectura de una conexión
//! a medida que llegan bytes. Puede retomarse en cualquier punto: si falta
//! información retorna `HttpCode::NoRequest` y continúa desde el mismo
//! cursor en la siguiente lectura.
//!
//! ## Estados
//!
//! ```text
//! RequestLine ──▶ Headers ──▶ (Body) ──▶ petición completa
//! ```
//!
//! ## Extracción de líneas
//!
//! `parse_line` busca el terminador `\r\n` desde el cursor y lo sobrescribe
//! con bytes NUL en el mismo buffer. En el estado `Body` no se separan
//! líneas: el cuerpo se completa por `Content-Length`.

use tracing::debug;

/// Tamaño del buffer de lectura de cada conexión
pub const READ_BUFFER_SIZE: usize = 2048;

/// Página servida cuando el target es `/`
pub const DEFAULT_PAGE: &str = "/judge.html";

/// Métodos HTTP reconocidos por el parser
///
/// Solo GET y POST se aceptan; el resto produce `BadRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    HEAD,
    PUT,
    DELETE,
    TRACE,
    OPTIONS,
    CONNECT,
    PATCH,
}

impl Method {
    const ALL: [Method; 9] = [
        Method::GET,
        Method::POST,
        Method::HEAD,
        Method::PUT,
        Method::DELETE,
        Method::TRACE,
        Method::OPTIONS,
        Method::CONNECT,
        Method::PATCH,
    ];

    /// Parsea un método sin distinguir mayúsculas
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_httpd::http::request::Method;
    /// assert_eq!(Method::parse("get"), Some(Method::GET));
    /// assert_eq!(Method::parse("FOO"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::HEAD => "HEAD",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::TRACE => "TRACE",
            Method::OPTIONS => "OPTIONS",
            Method::CONNECT => "CONNECT",
            Method::PATCH => "PATCH",
        }
    }
}

/// Estado del parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    RequestLine,
    Headers,
    Body,
}

/// Resultado de buscar una línea en el buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Se encontró `\r\n`
    Complete,
    /// `\r` o `\n` sueltos
    Malformed,
    /// Faltan bytes
    Incomplete,
}

/// Resultado de procesar una petición
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// Faltan bytes: re-armar para lectura sin responder
    NoRequest,
    /// Petición completa, lista para resolver
    GetRequest,
    BadRequest,
    NoResource,
    Forbidden,
    /// Archivo abierto y mapeado
    FileRequest,
    InternalError,
    ClosedConnection,
}

/// Parser incremental de una petición
#[derive(Debug, Default)]
pub struct RequestParser {
    state: CheckState,
    /// Siguiente byte a examinar
    cursor: usize,
    /// Inicio de la línea en curso
    line_start: usize,

    method: Option<Method>,
    target: String,
    version: String,
    host: Option<String>,
    content_length: usize,
    keep_alive: bool,
    /// La petición es un envío de formulario (POST)
    form: bool,
    body: Vec<u8>,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vuelve al estado inicial para la siguiente petición
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Procesa los bytes disponibles en `buf[..read_len]`.
    ///
    /// Retorna `GetRequest` cuando la petición está completa, `NoRequest`
    /// si faltan bytes o `BadRequest` si es inválida.
    pub fn parse(&mut self, buf: &mut [u8], read_len: usize) -> HttpCode {
        loop {
            if self.state == CheckState::Body {
                return self.parse_body(buf, read_len);
            }

            match self.parse_line(buf, read_len) {
                LineStatus::Complete => {}
                LineStatus::Incomplete => return HttpCode::NoRequest,
                LineStatus::Malformed => return HttpCode::BadRequest,
            }

            let Ok(line) = std::str::from_utf8(self.take_line(buf)) else {
                return HttpCode::BadRequest;
            };
            debug!(line, "request line received");

            let code = match self.state {
                CheckState::RequestLine => self.parse_request_line(line),
                CheckState::Headers => self.parse_header(line),
                CheckState::Body => unreachable!("body state handled above"),
            };

            if code != HttpCode::NoRequest {
                return code;
            }
        }
    }

    /// Busca el siguiente terminador de línea desde el cursor.
    ///
    /// Los dos bytes de `\r\n` se reemplazan por NUL y el cursor avanza
    /// más allá de ellos.
    pub fn parse_line(&mut self, buf: &mut [u8], read_len: usize) -> LineStatus {
        while self.cursor < read_len {
            match buf[self.cursor] {
                b'\r' => {
                    if self.cursor + 1 == read_len {
                        return LineStatus::Incomplete;
                    }
                    if buf[self.cursor + 1] == b'\n' {
                        buf[self.cursor] = 0;
                        buf[self.cursor + 1] = 0;
                        self.cursor += 2;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Malformed;
                }
                b'\n' => {
                    if self.cursor > 1 && buf[self.cursor - 1] == b'\r' {
                        buf[self.cursor - 1] = 0;
                        buf[self.cursor] = 0;
                        self.cursor += 1;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Malformed;
                }
                _ => self.cursor += 1,
            }
        }
        LineStatus::Incomplete
    }

    /// Devuelve la última línea completa (sin terminador) y mueve el
    /// inicio de línea al cursor.
    pub fn take_line<'b>(&mut self, buf: &'b [u8]) -> &'b [u8] {
        let start = self.line_start;
        let end = buf[start..self.cursor]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.cursor, |offset| start + offset);
        self.line_start = self.cursor;
        &buf[start..end]
    }

    fn parse_request_line(&mut self, line: &str) -> HttpCode {
        let Some((method, rest)) = split_token(line) else {
            return HttpCode::BadRequest;
        };

        match Method::parse(method) {
            Some(Method::GET) => {}
            Some(Method::POST) => self.form = true,
            other => {
                debug!(method, recognized = other.is_some(), "method rejected");
                return HttpCode::BadRequest;
            }
        }

        let Some((target, version)) = split_token(rest) else {
            return HttpCode::BadRequest;
        };
        if version != "HTTP/1.1" {
            return HttpCode::BadRequest;
        }

        let Some(target) = strip_scheme(target) else {
            return HttpCode::BadRequest;
        };
        if !target.starts_with('/') {
            return HttpCode::BadRequest;
        }

        self.method = Method::parse(method);
        self.target = if target == "/" {
            DEFAULT_PAGE.to_string()
        } else {
            target.to_string()
        };
        self.version = version.to_string();
        self.state = CheckState::Headers;
        HttpCode::NoRequest
    }

    fn parse_header(&mut self, line: &str) -> HttpCode {
        if line.is_empty() {
            if self.content_length != 0 {
                self.state = CheckState::Body;
                return HttpCode::NoRequest;
            }
            return HttpCode::GetRequest;
        }

        if let Some(value) = strip_prefix_ci(line, "Connection:") {
            if trim_ws(value).eq_ignore_ascii_case("keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some(value) = strip_prefix_ci(line, "Content-Length:") {
            match trim_ws(value).parse::<usize>() {
                Ok(len) if len <= READ_BUFFER_SIZE => self.content_length = len,
                _ => return HttpCode::BadRequest,
            }
        } else if let Some(value) = strip_prefix_ci(line, "Host:") {
            self.host = Some(trim_ws(value).to_string());
        } else {
            debug!(header = line, "unknown header ignored");
        }
        HttpCode::NoRequest
    }

    fn parse_body(&mut self, buf: &[u8], read_len: usize) -> HttpCode {
        let end = self.cursor + self.content_length;
        if read_len >= end {
            self.body = buf[self.cursor..end].to_vec();
            return HttpCode::GetRequest;
        }
        HttpCode::NoRequest
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn is_form(&self) -> bool {
        self.form
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn is_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn trim_ws(s: &str) -> &str {
    s.trim_matches(is_ws)
}

/// Separa el primer token y devuelve el resto sin espacios iniciales
fn split_token(s: &str) -> Option<(&str, &str)> {
    let (head, tail) = s.split_once(is_ws)?;
    Some((head, tail.trim_start_matches(is_ws)))
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

/// Quita `http://host` o `https://host` dejando el path
fn strip_scheme(target: &str) -> Option<&str> {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = strip_prefix_ci(target, scheme) {
            return rest.find('/').map(|idx| &rest[idx..]);
        }
    }
    Some(target)
}
