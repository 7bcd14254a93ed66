//! # Primitivas de Sincronización
//! src/sync/primitives.rs
//!
//! Envoltorios delgados sobre `std::sync`:
//! - `Locker<T>`: mutex que recupera el dato si otro thread entró en pánico
//! - `Cond`: variable de condición con espera temporizada
//! - `Semaphore`: semáforo contador con cierre para apagar workers

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Mutex exclusivo sobre un valor `T`
#[derive(Debug, Default)]
pub struct Locker<T> {
    inner: Mutex<T>,
}

impl<T> Locker<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Adquiere el lock. Un mutex envenenado se recupera: los datos
    /// protegidos aquí siguen siendo válidos aunque un worker haya fallado.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resultado de una espera temporizada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Variable de condición
///
/// Los llamadores siempre re-verifican su predicado en un loop:
/// no se garantiza ausencia de despertares espurios.
#[derive(Debug, Default)]
pub struct Cond {
    inner: Condvar,
}

impl Cond {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Bloquea hasta recibir una señal
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.inner.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Bloquea hasta recibir una señal o hasta `deadline`
    pub fn timed_wait<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: Instant,
    ) -> (MutexGuard<'a, T>, WaitOutcome) {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (guard, result) = self
            .inner
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);

        let outcome = if result.timed_out() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Signaled
        };
        (guard, outcome)
    }

    /// Despierta a un waiter
    pub fn signal(&self) {
        self.inner.notify_one();
    }

    /// Despierta a todos los waiters
    pub fn broadcast(&self) {
        self.inner.notify_all();
    }
}

#[derive(Debug)]
struct SemState {
    permits: usize,
    closed: bool,
}

/// Semáforo contador
///
/// `close()` despierta a todos los waiters; desde ese momento `wait()`
/// retorna `false` aunque queden permisos.
#[derive(Debug)]
pub struct Semaphore {
    state: Locker<SemState>,
    cond: Cond,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Locker::new(SemState {
                permits,
                closed: false,
            }),
            cond: Cond::new(),
        }
    }

    /// Decrementa el contador, bloqueando mientras sea cero.
    ///
    /// Retorna `false` si el semáforo fue cerrado.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            state = self.cond.wait(state);
        }
    }

    /// Versión no bloqueante de `wait`
    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.permits == 0 {
            return false;
        }
        state.permits -= 1;
        true
    }

    /// Incrementa el contador y despierta a un waiter
    pub fn post(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        self.cond.signal();
    }

    /// Cierra el semáforo y despierta a todos los waiters
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.broadcast();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Permisos disponibles en este instante
    pub fn available(&self) -> usize {
        self.state.lock().permits
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // ==================== Locker ====================

    #[test]
    fn test_locker_mutates_value() {
        let locker = Locker::new(1);
        *locker.lock() += 41;
        assert_eq!(*locker.lock(), 42);
        assert_eq!(locker.into_inner(), 42);
    }

    #[test]
    fn test_locker_recovers_from_poison() {
        let locker = Arc::new(Locker::new(vec![1]));
        let clone = Arc::clone(&locker);

        let _ = thread::spawn(move || {
            let _guard = clone.lock();
            panic!("worker failed while holding the lock");
        })
        .join();

        locker.lock().push(2);
        assert_eq!(*locker.lock(), vec![1, 2]);
    }

    // ==================== Cond ====================

    #[test]
    fn test_cond_timed_wait_times_out() {
        let locker = Locker::new(());
        let cond = Cond::new();

        let start = Instant::now();
        let deadline = start + Duration::from_millis(50);
        let (_guard, outcome) = cond.timed_wait(locker.lock(), deadline);

        // Un despertar espurio también es válido; en la práctica expira
        if outcome == WaitOutcome::TimedOut {
            assert!(start.elapsed() >= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_cond_signal_wakes_waiter() {
        let shared = Arc::new((Locker::new(false), Cond::new()));
        let clone = Arc::clone(&shared);

        let waiter = thread::spawn(move || {
            let (locker, cond) = &*clone;
            let mut ready = locker.lock();
            while !*ready {
                ready = cond.wait(ready);
            }
            true
        });

        thread::sleep(Duration::from_millis(20));
        {
            let (locker, cond) = &*shared;
            *locker.lock() = true;
            cond.broadcast();
        }

        assert!(waiter.join().unwrap());
    }

    // ==================== Semaphore ====================

    #[test]
    fn test_semaphore_counts_permits() {
        let sem = Semaphore::new(2);
        assert!(sem.wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        assert_eq!(sem.available(), 0);

        sem.post();
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn test_semaphore_post_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::default());
        let acquired = Arc::new(AtomicUsize::new(0));

        let handle = {
            let sem = Arc::clone(&sem);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                if sem.wait() {
                    acquired.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        sem.post();
        handle.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_semaphore_close_releases_all_waiters() {
        let sem = Arc::new(Semaphore::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        sem.close();

        for handle in handles {
            assert!(!handle.join().unwrap());
        }
        assert!(sem.is_closed());
        assert!(!sem.wait());
    }
}
