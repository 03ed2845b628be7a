use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Per-process guard against handling the same mail twice.
///
/// Only covers this process's lifetime. Handlers that must be idempotent
/// across restarts still need to check for their own side effects.
#[derive(Debug, Default)]
pub struct MessageDeduplicator {
    seen: Mutex<HashSet<String>>,
}

impl MessageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-mark. Returns false the first time an id is seen and true
    /// afterwards. Empty ids are never recorded and always return false.
    pub fn already_processed(&self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return false;
        }
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let duplicate = !seen.insert(message_id.to_string());
        if duplicate {
            tracing::debug!(message_id, "skipping duplicate message");
        }
        duplicate
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_sighting_is_not_processed() {
        let d = MessageDeduplicator::new();
        assert!(!d.already_processed("m-1"));
        assert!(d.already_processed("m-1"));
        assert!(d.already_processed("m-1"));
    }

    #[test]
    fn distinct_ids_do_not_interfere() {
        let d = MessageDeduplicator::new();
        assert!(!d.already_processed("a"));
        assert!(!d.already_processed("b"));
        assert!(d.already_processed("a"));
        assert!(d.already_processed("b"));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn empty_id_passes_through() {
        let d = MessageDeduplicator::new();
        assert!(!d.already_processed(""));
        assert!(!d.already_processed(""));
        assert!(d.is_empty());
    }

    #[test]
    fn concurrent_callers_see_exactly_one_first() {
        let d = Arc::new(MessageDeduplicator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&d);
                thread::spawn(move || d.already_processed("shared"))
            })
            .collect();
        let firsts = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|dup| !dup)
            .count();
        assert_eq!(firsts, 1);
    }
}
