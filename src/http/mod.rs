//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto de HTTP/1.1 servido sobre sockets no bloqueantes:
//!
//! - `request`: máquina de estados que parsea línea de petición, cabeceras
//!   y cuerpo de forma incremental
//! - `response`: buffer acotado donde se arman las cabeceras
//! - `status`: códigos de estado y páginas de error
//! - `connection`: estado completo de un cliente (lectura, parseo,
//!   resolución de archivo y escritura con `writev`)
//!
//! ### Formato de Request
//!
//! ```text
//! POST /2CGISQL.cgi HTTP/1.1\r\n
//! Host: localhost\r\n
//! Connection: keep-alive\r\n
//! Content-Length: 22\r\n
//! \r\n
//! user=ana&password=1234
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 512\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <contenido del archivo>
//! ```

pub mod connection;
pub mod request;
pub mod response;
pub mod status;

pub use connection::{Connection, Next, RequestContext};
pub use request::{HttpCode, Method, RequestParser};
pub use response::ResponseBuffer;
pub use status::StatusCode;
