//! # Cache de Usuarios
//! src/credentials/cache.rs
//!
//! Mapa usuario → digest de contraseña compartido por todos los workers.
//! Se carga una vez al arrancar desde el almacén y se actualiza con cada
//! registro exitoso.
//!
//! El registro es una operación compuesta atómica: comprobar duplicado,
//! insertar en el almacén y cachear ocurren bajo el mismo lock. Dos
//! registros simultáneos del mismo nombre producen como máximo una
//! inserción.

use crate::credentials::digest_password;
use crate::credentials::form::Credentials;
use crate::error::StoreError;
use crate::sync::Locker;
use std::collections::HashMap;
use tracing::warn;

/// Resultado de un intento de registro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Duplicate,
    StoreFailed,
}

/// Cache de credenciales en memoria
#[derive(Debug, Default)]
pub struct UserCache {
    users: Locker<HashMap<String, String>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carga pares (usuario, digest) leídos del almacén
    pub fn load<I>(&self, users: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.users.lock().extend(users);
    }

    /// `true` si existe el usuario y la contraseña coincide
    pub fn verify(&self, credentials: &Credentials) -> bool {
        let digest = digest_password(&credentials.password);
        self.users
            .lock()
            .get(&credentials.name)
            .map_or(false, |stored| *stored == digest)
    }

    /// Registra un usuario nuevo.
    ///
    /// `insert` recibe (usuario, digest) y persiste el par en el almacén;
    /// solo si tiene éxito el par entra al cache.
    pub fn register_with<F>(&self, credentials: &Credentials, insert: F) -> RegisterOutcome
    where
        F: FnOnce(&str, &str) -> Result<(), StoreError>,
    {
        let mut users = self.users.lock();
        if users.contains_key(&credentials.name) {
            return RegisterOutcome::Duplicate;
        }

        let digest = digest_password(&credentials.password);
        match insert(&credentials.name, &digest) {
            Ok(()) => {
                users.insert(credentials.name.clone(), digest);
                RegisterOutcome::Registered
            }
            Err(StoreError::Duplicate(_)) => RegisterOutcome::Duplicate,
            Err(err) => {
                warn!(user = %credentials.name, error = %err, "user insert failed");
                RegisterOutcome::StoreFailed
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
