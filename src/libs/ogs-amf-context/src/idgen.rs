//! Bounded identifier generator
//!
//! Hands out integers from a closed range `[min, max]`. Freed values go to the
//! tail of a free list and are reused before the cursor advances again, so a
//! freed value becomes allocatable immediately. The range is walked lazily, which
//! keeps large ranges (32-bit TMSI, 40-bit AMF UE NGAP ID) cheap.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
struct IdGeneratorState {
    /// Next never-allocated value (may exceed `max` once the range is walked)
    cursor: i64,
    /// Values returned by `free`, reused first (head = oldest)
    free: VecDeque<i64>,
    /// Values currently allocated
    used: HashSet<i64>,
}

/// Thread-safe bounded ID generator
#[derive(Debug)]
pub struct IdGenerator {
    min: i64,
    max: i64,
    state: Mutex<IdGeneratorState>,
}

impl IdGenerator {
    /// Create a generator over the closed range `[min, max]`.
    ///
    /// An inverted range yields a generator that is permanently exhausted.
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            state: Mutex::new(IdGeneratorState {
                cursor: min,
                free: VecDeque::new(),
                used: HashSet::new(),
            }),
        }
    }

    /// Lower bound of the range
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Upper bound of the range
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Allocate an unused value, or `None` when the range is exhausted
    pub fn allocate(&self) -> Option<i64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(id) = state.free.pop_front() {
            // A value can sit in the free list only once; skip anything that
            // was re-marked as used through another path.
            if state.used.insert(id) {
                return Some(id);
            }
        }

        if state.cursor <= self.max {
            let id = state.cursor;
            state.cursor += 1;
            state.used.insert(id);
            return Some(id);
        }

        None
    }

    /// Return a value to the generator.
    ///
    /// Values outside the range or not currently allocated are ignored.
    pub fn free(&self, id: i64) {
        if id < self.min || id > self.max {
            log::debug!("ID [{}] out of range [{}..{}], ignored", id, self.min, self.max);
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.used.remove(&id) {
            state.free.push_back(id);
        }
    }

    /// Check whether a value is currently allocated
    pub fn is_allocated(&self, id: i64) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.used.contains(&id)
    }

    /// Number of values currently allocated
    pub fn allocated(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_distinct() {
        let gen = IdGenerator::new(1, 100);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = gen.allocate().unwrap();
            assert!((1..=100).contains(&id));
            assert!(seen.insert(id));
        }
        assert_eq!(gen.allocated(), 100);
    }

    #[test]
    fn test_free_and_reuse() {
        let gen = IdGenerator::new(1, 2);
        let a = gen.allocate().unwrap();
        let b = gen.allocate().unwrap();
        assert_ne!(a, b);

        gen.free(a);
        assert_eq!(gen.allocate(), Some(a));
    }

    #[test]
    fn test_exhaustion_is_repeatable() {
        let gen = IdGenerator::new(1, 2);
        assert!(gen.allocate().is_some());
        assert!(gen.allocate().is_some());
        assert_eq!(gen.allocate(), None);
        assert_eq!(gen.allocate(), None);

        gen.free(2);
        assert_eq!(gen.allocate(), Some(2));
        assert_eq!(gen.allocate(), None);
    }

    #[test]
    fn test_free_out_of_range_or_unallocated() {
        let gen = IdGenerator::new(1, 2);
        gen.free(-999);
        gen.free(999);
        gen.free(1); // not allocated yet
        assert_eq!(gen.allocated(), 0);

        let id = gen.allocate().unwrap();
        gen.free(id);
        gen.free(id); // double free
        assert_eq!(gen.allocate(), Some(id));
        assert_ne!(gen.allocate(), Some(id));
    }

    #[test]
    fn test_inverted_range() {
        let gen = IdGenerator::new(10, 1);
        assert_eq!(gen.allocate(), None);
    }

    #[test]
    fn test_concurrent_allocate_free() {
        let gen = Arc::new(IdGenerator::new(1, 10_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gen = Arc::clone(&gen);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..500 {
                        mine.push(gen.allocate().unwrap());
                    }
                    for id in mine.iter().step_by(2) {
                        gen.free(*id);
                    }
                    mine.into_iter().skip(1).step_by(2).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut kept = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(kept.insert(id), "duplicate issuance of {}", id);
            }
        }
        assert_eq!(gen.allocated(), kept.len());
    }
}
