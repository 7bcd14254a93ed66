//! # Cola Circular Acotada
//! src/sync/block_queue.rs
//!
//! Cola FIFO multi-productor/multi-consumidor de capacidad fija.
//!
//! `push` y `pop` fallan de inmediato (lleno/vacío); solo `pop_timed`
//! bloquea, hasta un plazo máximo.

use crate::error::ServerError;
use crate::sync::primitives::{Cond, Locker, WaitOutcome};
use std::time::{Duration, Instant};

/// Buffer circular interno: `front` apunta al elemento más antiguo y
/// `back` a la siguiente posición libre.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    front: usize,
    back: usize,
    count: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            front: 0,
            back: 0,
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        if self.count == self.capacity() {
            return Err(item);
        }
        self.slots[self.back] = Some(item);
        self.back = (self.back + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.front].take();
        self.front = (self.front + 1) % self.capacity();
        self.count -= 1;
        item
    }

    fn newest_index(&self) -> usize {
        (self.back + self.capacity() - 1) % self.capacity()
    }

    fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.front = 0;
        self.back = 0;
        self.count = 0;
    }
}

/// Cola circular acotada thread-safe
pub struct BoundedQueue<T> {
    ring: Locker<Ring<T>>,
    not_empty: Cond,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Crea una cola con capacidad fija. Una capacidad cero es un error.
    pub fn new(capacity: usize) -> Result<Self, ServerError> {
        if capacity == 0 {
            return Err(ServerError::ZeroCapacity);
        }
        Ok(Self {
            ring: Locker::new(Ring::with_capacity(capacity)),
            not_empty: Cond::new(),
            capacity,
        })
    }

    /// Encola sin bloquear. Si la cola está llena devuelve el elemento.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut ring = self.ring.lock();
        ring.push(item)?;
        self.not_empty.broadcast();
        Ok(())
    }

    /// Desencola sin bloquear
    pub fn pop(&self) -> Option<T> {
        self.ring.lock().pop()
    }

    /// Desencola esperando a lo sumo `timeout`.
    ///
    /// Retorna `None` si al vencer el plazo la cola sigue vacía.
    pub fn pop_timed(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring.lock();

        loop {
            if let Some(item) = ring.pop() {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            let (guard, outcome) = self.not_empty.timed_wait(ring, deadline);
            ring = guard;
            if outcome == WaitOutcome::TimedOut && ring.count == 0 {
                return None;
            }
        }
    }

    /// Vacía la cola sin despertar a nadie
    pub fn clear(&self) {
        self.ring.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copia del elemento más antiguo
    pub fn front(&self) -> Option<T> {
        let ring = self.ring.lock();
        if ring.count == 0 {
            return None;
        }
        ring.slots[ring.front].clone()
    }

    /// Copia del elemento más reciente
    pub fn back(&self) -> Option<T> {
        let ring = self.ring.lock();
        if ring.count == 0 {
            return None;
        }
        ring.slots[ring.newest_index()].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // ==================== Construcción ====================

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u8>::new(0),
            Err(ServerError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue = BoundedQueue::<u8>::new(3).unwrap();
        assert!(queue.is_empty());
        assert!(!queue.is_full());
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.front(), None);
        assert_eq!(queue.back(), None);
    }

    // ==================== Push / Pop ====================

    #[test]
    fn test_fifo_order_across_wraparound() {
        let queue = BoundedQueue::new(3).unwrap();

        for round in 0..4 {
            let base = round * 10;
            queue.push(base + 1).unwrap();
            queue.push(base + 2).unwrap();
            assert_eq!(queue.front(), Some(base + 1));
            assert_eq!(queue.back(), Some(base + 2));
            assert_eq!(queue.pop(), Some(base + 1));
            assert_eq!(queue.pop(), Some(base + 2));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_on_full_queue_fails_fast() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.push("a").unwrap();
        queue.push("b").unwrap();

        let start = Instant::now();
        assert_eq!(queue.push("c"), Err("c"));
        assert!(start.elapsed() < Duration::from_millis(50));

        assert!(queue.is_full());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_on_empty_queue_fails_fast() {
        let queue = BoundedQueue::<u32>::new(2).unwrap();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_count_never_exceeds_capacity() {
        let queue = BoundedQueue::new(4).unwrap();
        let mut expected = std::collections::VecDeque::new();

        // Secuencia determinista de push/pop mezclados
        for step in 0..200u32 {
            if step % 3 == 2 {
                assert_eq!(queue.pop(), expected.pop_front());
            } else if queue.push(step).is_ok() {
                expected.push_back(step);
            } else {
                assert_eq!(expected.len(), 4);
            }
            assert!(queue.len() <= queue.capacity());
            assert_eq!(queue.len(), expected.len());
        }
    }

    #[test]
    fn test_clear_resets_state() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.clear();

        assert!(queue.is_empty());
        queue.push(3).unwrap();
        assert_eq!(queue.front(), Some(3));
        assert_eq!(queue.back(), Some(3));
    }

    // ==================== Pop temporizado ====================

    #[test]
    fn test_pop_timed_waits_at_least_timeout() {
        let queue = BoundedQueue::<u8>::new(1).unwrap();
        let timeout = Duration::from_millis(60);

        let start = Instant::now();
        assert_eq!(queue.pop_timed(timeout), None);
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_pop_timed_receives_item_from_producer() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(7u8).unwrap();
            })
        };

        assert_eq!(queue.pop_timed(Duration::from_secs(5)), Some(7));
        producer.join().unwrap();
    }
}
