//! # Reactor HTTP Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos construido sobre un reactor
//! epoll y un pool fijo de workers. Sirve archivos de un directorio raíz
//! y resuelve formularios de login/registro contra un almacén de
//! credenciales.
//!
//! ## Arquitectura
//!
//! - `reactor`: envoltorio de epoll (nivel/flanco, one-shot)
//! - `sync`: lock, condición, semáforo y cola acotada
//! - `pool`: workers que consumen trabajos de la cola
//! - `http`: parser incremental, respuestas y estado de conexión
//! - `router`: traducción de acciones a páginas
//! - `credentials`: formulario, cache de usuarios y almacén JSON
//! - `server`: event loop, tabla de conexiones y apagado
//! - `metrics`: contadores del servidor
//! - `config` y `logging`: arranque del proceso
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use reactor_httpd::config::Config;
//! use reactor_httpd::server::Server;
//!
//! let config = Config::default();
//! let mut server = Server::bind(config).expect("bind failed");
//! server.run().expect("server failed");
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod reactor;
pub mod router;
pub mod server;
pub mod sync;

pub use error::{ServerError, StoreError};
