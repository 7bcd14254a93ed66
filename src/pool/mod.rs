//! # Pool de Workers
//! src/pool/mod.rs
//!
//! Conjunto fijo de threads que consumen una cola acotada de trabajos.
//!
//! ## Protocolo
//!
//! ```text
//! submit:  push en la cola ──▶ post al semáforo
//! worker:  wait al semáforo ──▶ pop de la cola ──▶ handler(item)
//! ```
//!
//! El `post` siempre ocurre después del `push`, así que cada permiso
//! tiene un elemento detrás; aun así el worker tolera un `pop` vacío.
//!
//! `shutdown` cierra el semáforo y hace join de todos los workers. Los
//! elementos que queden en la cola se descartan.

pub mod dispatch;

pub use dispatch::{DispatchMode, Dispatcher, WorkItem};

use crate::error::ServerError;
use crate::sync::{BoundedQueue, Semaphore};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Dimensiones del pool
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Número de threads
    pub threads: usize,
    /// Capacidad máxima de la cola
    pub max_requests: usize,
}

struct Shared<T> {
    queue: BoundedQueue<T>,
    pending: Semaphore,
}

/// Pool de workers genérico sobre el tipo de trabajo
pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Crea la cola y lanza `config.threads` workers que ejecutan `handler`.
    ///
    /// No poder lanzar un thread es fatal: los ya lanzados se detienen.
    pub fn new<F>(config: PoolConfig, handler: F) -> Result<Self, ServerError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if config.threads == 0 {
            return Err(ServerError::Config("worker threads must be >= 1".to_string()));
        }

        let shared = Arc::new(Shared {
            queue: BoundedQueue::new(config.max_requests)?,
            pending: Semaphore::new(0),
        });
        let handler = Arc::new(handler);

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(config.threads),
        };

        for i in 0..config.threads {
            let name = format!("worker-{}", i);
            let shared = Arc::clone(&pool.shared);
            let handler = Arc::clone(&handler);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(shared, handler))
                .map_err(|source| ServerError::Spawn { name, source })?;
            pool.workers.push(handle);
        }

        debug!(
            threads = config.threads,
            max_requests = config.max_requests,
            "worker pool started"
        );
        Ok(pool)
    }

    /// Encola un trabajo. Si la cola está llena devuelve el elemento al
    /// llamador, que decide qué hacer con él.
    pub fn submit(&self, item: T) -> Result<(), T> {
        self.shared.queue.push(item)?;
        self.shared.pending.post();
        Ok(())
    }

    /// Trabajos en cola (no incluye los que se están ejecutando)
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Detiene y espera a todos los workers
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.pending.close();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(worker = %name, "worker panicked");
            }
        }
        self.shared.queue.clear();
        debug!("worker pool stopped");
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loop principal del worker
fn worker_loop<T, F>(shared: Arc<Shared<T>>, handler: Arc<F>)
where
    F: Fn(T),
{
    while shared.pending.wait() {
        // Permiso sin elemento: se tolera y se vuelve a esperar
        let Some(item) = shared.queue.pop() else {
            continue;
        };
        handler(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Locker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    // ==================== Construcción ====================

    #[test]
    fn test_zero_threads_rejected() {
        let result = WorkerPool::new(
            PoolConfig {
                threads: 0,
                max_requests: 4,
            },
            |_: u32| {},
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let result = WorkerPool::new(
            PoolConfig {
                threads: 1,
                max_requests: 0,
            },
            |_: u32| {},
        );
        assert!(matches!(result, Err(ServerError::ZeroCapacity)));
    }

    // ==================== Procesamiento ====================

    #[test]
    fn test_all_items_processed() {
        let count = Arc::new(AtomicUsize::new(0));
        let pool = {
            let count = Arc::clone(&count);
            WorkerPool::new(
                PoolConfig {
                    threads: 4,
                    max_requests: 100,
                },
                move |n: usize| {
                    count.fetch_add(n, Ordering::SeqCst);
                },
            )
            .unwrap()
        };

        for _ in 0..50 {
            pool.submit(1).unwrap();
        }
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 50));
        assert_eq!(pool.threads(), 4);
    }

    #[test]
    fn test_overflow_rejected_and_accepted_processed_once() {
        let gate = Arc::new(Semaphore::new(0));
        let seen = Arc::new(Locker::new(Vec::new()));

        let mut pool = {
            let gate = Arc::clone(&gate);
            let seen = Arc::clone(&seen);
            WorkerPool::new(
                PoolConfig {
                    threads: 2,
                    max_requests: 3,
                },
                move |id: u32| {
                    gate.wait();
                    seen.lock().push(id);
                },
            )
            .unwrap()
        };

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for id in 0..20 {
            match pool.submit(id) {
                Ok(()) => accepted.push(id),
                Err(back) => rejected.push(back),
            }
        }

        // Como mucho 2 en ejecución + 3 en cola
        assert!(accepted.len() <= 5, "accepted {:?}", accepted);
        assert!(!rejected.is_empty());
        // Con los dos workers detenidos en el gate el resto sigue en cola
        assert!(wait_until(|| pool.pending() == accepted.len() - 2));

        for _ in 0..accepted.len() {
            gate.post();
        }
        assert!(wait_until(|| seen.lock().len() == accepted.len()));

        let mut processed = seen.lock().clone();
        processed.sort_unstable();
        assert_eq!(processed, accepted);

        pool.shutdown();
        assert_eq!(pool.threads(), 0);
    }

    // ==================== Apagado ====================

    #[test]
    fn test_shutdown_joins_idle_workers() {
        let mut pool = WorkerPool::new(
            PoolConfig {
                threads: 3,
                max_requests: 8,
            },
            |_: u8| {},
        )
        .unwrap();

        let start = Instant::now();
        pool.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(pool.threads(), 0);

        // Idempotente
        pool.shutdown();
    }

    #[test]
    fn test_drop_discards_queued_items() {
        let gate = Arc::new(Semaphore::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let pool = {
            let gate = Arc::clone(&gate);
            WorkerPool::new(
                PoolConfig {
                    threads: 1,
                    max_requests: 4,
                },
                move |_item: Tracked| {
                    gate.wait();
                },
            )
            .unwrap()
        };

        for _ in 0..3 {
            assert!(pool.submit(Tracked(Arc::clone(&dropped))).is_ok());
        }

        // Liberar al worker bloqueado para que el join termine
        gate.close();
        drop(pool);
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
    }
}
