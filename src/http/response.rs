//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Las cabeceras (y los cuerpos cortos) se escriben en un buffer fijo por
//! conexión. El contenido de un archivo nunca se copia aquí: viaja como
//! segundo segmento del `writev` directamente desde el mapeo en memoria.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 1234\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use reactor_httpd::http::{ResponseBuffer, StatusCode};
//!
//! let mut response = ResponseBuffer::new();
//! response.add_status_line(StatusCode::NotFound).unwrap();
//! response.add_headers(0, false).unwrap();
//! assert!(response.as_bytes().starts_with(b"HTTP/1.1 404 Not Found\r\n"));
//! ```

use super::StatusCode;
use std::fmt::{self, Write};
use thiserror::Error;

/// Tamaño del buffer de escritura de cada conexión
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Cuerpo que sustituye a un archivo vacío
pub const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// La respuesta no cabe en el buffer de escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response does not fit in the {capacity}-byte write buffer")]
pub struct BufferFull {
    pub capacity: usize,
}

/// Buffer de escritura de tamaño fijo
pub struct ResponseBuffer {
    buf: Box<[u8; WRITE_BUFFER_SIZE]>,
    len: usize,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; WRITE_BUFFER_SIZE]),
            len: 0,
        }
    }

    /// Descarta lo escrito
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// `HTTP/1.1 {code} {title}\r\n`
    pub fn add_status_line(&mut self, status: StatusCode) -> Result<(), BufferFull> {
        self.append(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    /// `Content-Length`, `Connection` y la línea en blanco final
    pub fn add_headers(
        &mut self,
        content_length: usize,
        keep_alive: bool,
    ) -> Result<(), BufferFull> {
        self.add_content_length(content_length)?;
        self.add_linger(keep_alive)?;
        self.add_blank_line()
    }

    pub fn add_content_length(&mut self, content_length: usize) -> Result<(), BufferFull> {
        self.append(format_args!("Content-Length: {}\r\n", content_length))
    }

    pub fn add_linger(&mut self, keep_alive: bool) -> Result<(), BufferFull> {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.append(format_args!("Connection: {}\r\n", value))
    }

    pub fn add_blank_line(&mut self) -> Result<(), BufferFull> {
        self.append(format_args!("\r\n"))
    }

    pub fn add_content(&mut self, content: &str) -> Result<(), BufferFull> {
        self.append(format_args!("{}", content))
    }

    /// Escribe texto formateado. Si no cabe, el buffer queda intacto.
    fn append(&mut self, args: fmt::Arguments<'_>) -> Result<(), BufferFull> {
        let start = self.len;
        let mut cursor = Cursor {
            buf: &mut self.buf[..],
            len: start,
        };

        match cursor.write_fmt(args) {
            Ok(()) => {
                self.len = cursor.len;
                Ok(())
            }
            Err(_) => {
                self.len = start;
                Err(BufferFull {
                    capacity: WRITE_BUFFER_SIZE,
                })
            }
        }
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBuffer")
            .field("len", &self.len)
            .field("text", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// Escritor acotado sobre el buffer
struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}
