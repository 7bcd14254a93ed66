//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales de arranque y errores del almacén de credenciales.
//! Los resultados del protocolo HTTP (petición mal formada, recurso
//! inexistente, etc.) no son errores: son valores de `HttpCode`.

use std::io;
use thiserror::Error;

/// Errores que abortan la inicialización o la ejecución del servidor
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("epoll failure: {0}")]
    Reactor(#[source] io::Error),

    #[error("credential store: {0}")]
    Store(#[from] StoreError),

    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("cannot spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errores del almacén de credenciales
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed users file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user {0} already exists")]
    Duplicate(String),

    #[error("connection pool is closed")]
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_mentions_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:80"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_store_error_converts_into_server_error() {
        let err: ServerError = StoreError::Duplicate("alice".to_string()).into();
        assert!(matches!(err, ServerError::Store(StoreError::Duplicate(_))));
        assert!(err.to_string().contains("alice"));
    }
}
