//! # Almacén de Credenciales
//! src/credentials/store.rs
//!
//! Persistencia de usuarios en un archivo JSON y pool de conexiones
//! acotado por semáforo.
//!
//! Cada "conexión" del pool es un handle al mismo archivo. El pool limita
//! cuántos workers pueden usar el almacén a la vez y `PooledConnection`
//! devuelve el handle al pool al salir de scope, también en caminos de
//! error.

use crate::error::StoreError;
use crate::sync::{Locker, Semaphore};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Operaciones que el servidor necesita del almacén
pub trait StoreConnection: Send {
    /// Todos los pares (usuario, digest)
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError>;

    /// Inserta un usuario nuevo. Falla con `Duplicate` si ya existe.
    fn insert_user(&mut self, name: &str, password_digest: &str) -> Result<(), StoreError>;
}

struct UsersFile {
    path: PathBuf,
    users: Locker<BTreeMap<String, String>>,
}

/// Almacén respaldado por un archivo JSON `{"usuario": "digest", ...}`
#[derive(Clone)]
pub struct JsonFileStore {
    inner: Arc<UsersFile>,
}

impl JsonFileStore {
    /// Abre el archivo; si no existe, el almacén empieza vacío
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let users = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), users = users.len(), "credential store opened");
        Ok(Self {
            inner: Arc::new(UsersFile {
                path,
                users: Locker::new(users),
            }),
        })
    }

    /// Nuevo handle boxed para el pool
    pub fn connection(&self) -> Box<dyn StoreConnection> {
        Box::new(self.clone())
    }

    /// Reescribe el archivo completo de forma atómica (temporal + rename)
    fn save(&self, users: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut temp_path = path.clone().into_os_string();
        temp_path.push(".tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, users)?;
        writer.flush()?;

        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl StoreConnection for JsonFileStore {
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError> {
        let users = self.inner.users.lock();
        Ok(users
            .iter()
            .map(|(name, digest)| (name.clone(), digest.clone()))
            .collect())
    }

    fn insert_user(&mut self, name: &str, password_digest: &str) -> Result<(), StoreError> {
        let mut users = self.inner.users.lock();
        if users.contains_key(name) {
            return Err(StoreError::Duplicate(name.to_string()));
        }

        users.insert(name.to_string(), password_digest.to_string());
        if let Err(err) = self.save(&users) {
            users.remove(name);
            return Err(err);
        }
        debug!(user = name, "user persisted");
        Ok(())
    }
}

/// Pool de conexiones al almacén
///
/// El semáforo cuenta las conexiones libres: `acquire` espera en él y
/// luego toma una conexión bajo el lock; `release` la devuelve y después
/// hace `post`.
pub struct ConnectionPool {
    free: Locker<Vec<Box<dyn StoreConnection>>>,
    reserve: Semaphore,
    max_conn: usize,
}

impl ConnectionPool {
    pub fn new(connections: Vec<Box<dyn StoreConnection>>) -> Self {
        let max_conn = connections.len();
        Self {
            free: Locker::new(connections),
            reserve: Semaphore::new(max_conn),
            max_conn,
        }
    }

    /// Abre un `JsonFileStore` y crea `size` handles sobre él
    pub fn open_json<P: AsRef<Path>>(path: P, size: usize) -> Result<Self, StoreError> {
        let store = JsonFileStore::open(path)?;
        Ok(Self::new((0..size).map(|_| store.connection()).collect()))
    }

    /// Bloquea hasta obtener una conexión libre
    ///
    /// Falla con `Exhausted` si el pool fue cerrado.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        if !self.reserve.wait() {
            return Err(StoreError::Exhausted);
        }
        self.take()
    }

    /// Versión no bloqueante de `acquire`
    pub fn try_acquire(&self) -> Option<PooledConnection<'_>> {
        if !self.reserve.try_wait() {
            return None;
        }
        self.take().ok()
    }

    fn take(&self) -> Result<PooledConnection<'_>, StoreError> {
        let conn = self.free.lock().pop().ok_or(StoreError::Exhausted)?;
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn release(&self, conn: Box<dyn StoreConnection>) {
        self.free.lock().push(conn);
        self.reserve.post();
    }

    /// Despierta a quien espere en `acquire`; las siguientes llamadas fallan
    pub fn close(&self) {
        self.reserve.close();
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    pub fn max_conn(&self) -> usize {
        self.max_conn
    }
}

/// Conexión prestada; vuelve al pool en `Drop`
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Box<dyn StoreConnection>>,
}

impl PooledConnection<'_> {
    /// Devuelve la conexión explícitamente
    pub fn release(self) {
        drop(self);
    }
}

impl StoreConnection for PooledConnection<'_> {
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError> {
        match self.conn.as_mut() {
            Some(conn) => conn.load_users(),
            None => Err(StoreError::Exhausted),
        }
    }

    fn insert_user(&mut self, name: &str, password_digest: &str) -> Result<(), StoreError> {
        match self.conn.as_mut() {
            Some(conn) => conn.insert_user(name, password_digest),
            None => Err(StoreError::Exhausted),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
