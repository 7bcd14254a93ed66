//! # Credenciales
//! src/credentials/mod.rs
//!
//! Colaborador externo del servidor para login y registro:
//! - `form`: extracción acotada de `user=..&password=..`
//! - `cache`: mapa en memoria compartido por todos los workers
//! - `store`: persistencia JSON y pool de conexiones
//!
//! Las contraseñas nunca se guardan en claro: cache y archivo contienen
//! el digest SHA-256 en hexadecimal.

pub mod cache;
pub mod form;
pub mod store;

pub use cache::{RegisterOutcome, UserCache};
pub use form::{parse_credentials, Credentials, FormError};
pub use store::{ConnectionPool, JsonFileStore, PooledConnection, StoreConnection};

use sha2::{Digest, Sha256};

/// Digest SHA-256 hexadecimal de una contraseña
///
/// # Ejemplo
/// ```
/// use reactor_httpd::credentials::digest_password;
/// assert_eq!(digest_password("abc").len(), 64);
/// ```
pub fn digest_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
