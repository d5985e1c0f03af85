//! Circular ready queue
//!
//! The logical head is the one entry the scheduler treats as active. Rotation
//! moves the head to the back; nothing else reorders the ring.

use std::collections::TryReserveError;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ReadyQueue<T> {
    ring: VecDeque<T>,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self {
            ring: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends at the tail. Fails only if the ring cannot grow.
    pub fn insert(&mut self, item: T) -> Result<(), TryReserveError> {
        self.ring.try_reserve(1)?;
        self.ring.push_back(item);
        Ok(())
    }

    pub fn head(&self) -> Option<&T> {
        self.ring.front()
    }

    /// The current head becomes the tail. No-op when empty.
    pub fn rotate(&mut self) {
        if let Some(item) = self.ring.pop_front() {
            self.ring.push_back(item);
        }
    }

    /// Rotates `n` times.
    pub fn rotate_by(&mut self, n: usize) {
        if !self.ring.is_empty() {
            let n = n % self.ring.len();
            self.ring.rotate_left(n);
        }
    }

    pub fn remove_head(&mut self) -> Option<T> {
        self.ring.pop_front()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Items from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ring.iter()
    }
}

impl<T: Clone> ReadyQueue<T> {
    /// Head-to-tail copy of the ring.
    pub fn to_vec(&self) -> Vec<T> {
        self.ring.iter().cloned().collect()
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ReadyQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            ring: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_queue() {
        let mut q: ReadyQueue<u32> = ReadyQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.head(), None);
        assert_eq!(q.remove_head(), None);
        q.rotate();
        assert!(q.to_vec().is_empty());
    }

    #[test]
    fn test_insert_keeps_fifo_order() {
        let mut q = ReadyQueue::new();
        for i in 1..=3 {
            q.insert(i).unwrap();
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.head(), Some(&1));
        assert_eq!(q.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_rotate_moves_head_to_back() {
        let mut q: ReadyQueue<_> = [1, 2, 3].into_iter().collect();
        q.rotate();
        assert_eq!(q.to_vec(), vec![2, 3, 1]);
        q.rotate_by(2);
        assert_eq!(q.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_head_relinks_ring() {
        let mut q: ReadyQueue<_> = [1, 2, 3].into_iter().collect();
        q.rotate();
        assert_eq!(q.remove_head(), Some(2));
        assert_eq!(q.to_vec(), vec![3, 1]);
        q.rotate();
        assert_eq!(q.head(), Some(&1));
    }

    #[test]
    fn test_removing_last_item_leaves_empty_ring() {
        let mut q = ReadyQueue::new();
        q.insert("only").unwrap();
        q.rotate();
        assert_eq!(q.head(), Some(&"only"));
        assert_eq!(q.remove_head(), Some("only"));
        assert!(q.is_empty());
        q.insert("next").unwrap();
        assert_eq!(q.to_vec(), vec!["next"]);
    }

    proptest! {
        #[test]
        fn prop_rotating_size_times_restores_head(items in prop::collection::vec(any::<u16>(), 1..50)) {
            let mut q: ReadyQueue<u16> = items.iter().copied().collect();
            for _ in 0..q.len() {
                q.rotate();
            }
            prop_assert_eq!(q.head(), items.first());
            prop_assert_eq!(q.to_vec(), items);
        }

        #[test]
        fn prop_rotate_by_matches_repeated_rotate(items in prop::collection::vec(any::<u8>(), 1..20), n in 0usize..64) {
            let mut a: ReadyQueue<u8> = items.iter().copied().collect();
            let mut b = a.clone();
            a.rotate_by(n);
            for _ in 0..n {
                b.rotate();
            }
            prop_assert_eq!(a.to_vec(), b.to_vec());
        }
    }
}
