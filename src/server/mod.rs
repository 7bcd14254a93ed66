//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Event loop sobre epoll:
//! 1. Acepta conexiones y las registra en la tabla
//! 2. Entrega cada evento de lectura/escritura al pool de workers
//! 3. Re-arma o cierra según el veredicto del worker
//! 4. Cierra conexiones inactivas

pub mod context;
pub mod table;
pub mod tcp;

pub use context::ServeContext;
pub use table::ConnectionTable;
pub use tcp::{install_signal_handlers, Server};
