use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Entries {
    // (sequence, key) in insertion order; entries whose sequence no longer
    // matches `live` were popped and are skipped.
    order: VecDeque<(u64, String)>,
    live: HashMap<String, (u64, Instant)>,
    next_seq: u64,
}

/// Bounded, insertion-ordered set that remembers when each key was added.
///
/// Internally synchronized. Once `capacity` keys are live, pushing a new key
/// evicts the oldest one.
#[derive(Debug)]
pub struct TimedSet {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl TimedSet {
    /// Set holding at most `capacity` keys (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Maximum number of live keys
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Track `key`. Returns false if it was already tracked, in which case its
    /// original insertion time is kept.
    pub fn push(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.live.contains_key(key) {
            return false;
        }

        while entries.live.len() >= self.capacity {
            let Some((seq, oldest)) = entries.order.pop_front() else {
                break;
            };
            if entries.live.get(&oldest).is_some_and(|(s, _)| *s == seq) {
                entries.live.remove(&oldest);
            }
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.order.push_back((seq, key.to_string()));
        entries.live.insert(key.to_string(), (seq, Instant::now()));
        true
    }

    /// Stop tracking `key`, returning how long it was tracked.
    pub fn pop(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, inserted) = entries.live.remove(key)?;
        if entries.order.len() > 2 * self.capacity {
            let Entries { order, live, .. } = &mut *entries;
            order.retain(|(seq, k)| live.get(k).is_some_and(|(s, _)| s == seq));
        }
        Some(inserted.elapsed())
    }

    /// Whether `key` is tracked
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .contains_key(key)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_is_idempotent() {
        let set = TimedSet::new(4);
        assert!(set.push("pod-a"));
        assert!(!set.push("pod-a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_oldest_is_evicted_at_capacity() {
        let set = TimedSet::new(3);
        for key in ["a", "b", "c", "d"] {
            set.push(key);
            assert!(set.len() <= 3);
        }
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
        assert!(set.contains("d"));
    }

    #[test]
    fn test_pop_reports_elapsed() {
        let set = TimedSet::new(2);
        set.push("pod-a");
        std::thread::sleep(Duration::from_millis(5));
        let waited = set.pop("pod-a").unwrap();
        assert!(waited >= Duration::from_millis(5));
        assert!(set.pop("pod-a").is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_repush_after_pop_is_not_evicted_by_stale_entry() {
        let set = TimedSet::new(2);
        set.push("a");
        set.push("b");
        set.pop("a");
        set.push("a");
        // "b" is now the oldest live key; the stale first "a" must be skipped.
        set.push("c");
        assert!(!set.contains("b"));
        assert!(set.contains("a"));
        assert!(set.contains("c"));
        assert_eq!(set.len(), 2);
    }
}
