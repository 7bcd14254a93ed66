//! # Sincronización
//! src/sync/mod.rs
//!
//! Base de todas las estructuras compartidas del servidor:
//! - `primitives`: mutex, variable de condición y semáforo
//! - `block_queue`: cola circular acotada usada por el pool de workers

pub mod block_queue;
pub mod primitives;

pub use block_queue::BoundedQueue;
pub use primitives::{Cond, Locker, Semaphore, WaitOutcome};
