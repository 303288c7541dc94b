//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, LoadBalancer};

/// Round-robin selector that skips dead backends.
///
/// The cursor is advanced atomically on every call. When the candidate is
/// dead and a later backend is picked instead, the cursor is moved to the
/// picked index so the rotation continues from there. Concurrent callers may
/// observe the same cursor value, so fairness is approximate.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let len = backends.len();
        let next = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len;

        for i in next..next + len {
            let index = i % len;
            let backend = &backends[index];
            if backend.is_alive() {
                if i != next {
                    self.cursor.store(index, Ordering::Relaxed);
                }
                return Some(Arc::clone(backend));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::tests::test_backend;
    use std::collections::HashSet;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let b1 = test_backend("http://127.0.0.1:8080");
        let b2 = test_backend("http://127.0.0.1:8081");
        let backends = vec![b1.clone(), b2.clone()];

        // The cursor is pre-incremented, so the rotation starts at index 1.
        let s1 = lb.next_server(&backends).unwrap();
        assert_eq!(s1.id(), b2.id());

        let s2 = lb.next_server(&backends).unwrap();
        assert_eq!(s2.id(), b1.id());

        let s3 = lb.next_server(&backends).unwrap();
        assert_eq!(s3.id(), b2.id());
    }

    #[test]
    fn test_skips_dead_backend() {
        let lb = RoundRobin::new();
        let a = test_backend("http://a");
        let b = test_backend("http://b");
        let c = test_backend("http://c");
        b.set_alive(false);
        let backends = vec![a.clone(), b.clone(), c.clone()];

        let mut seen = HashSet::new();
        for _ in 0..2 * backends.len() {
            let picked = lb.next_server(&backends).unwrap();
            assert_ne!(picked.id(), b.id());
            seen.insert(picked.id().to_string());
        }
        assert!(seen.contains(a.id()));
        assert!(seen.contains(c.id()));
    }

    #[test]
    fn test_cursor_persists_after_skip() {
        let lb = RoundRobin::new();
        let a = test_backend("http://a");
        let b = test_backend("http://b");
        let c = test_backend("http://c");
        b.set_alive(false);
        let backends = vec![a.clone(), b.clone(), c.clone()];

        // Candidate index 1 is dead: c is picked and the cursor parks on 2,
        // so the next call starts over at a. This only approximates fair
        // rotation; it is not a strict round-robin guarantee.
        assert_eq!(lb.next_server(&backends).unwrap().id(), c.id());
        assert_eq!(lb.next_server(&backends).unwrap().id(), a.id());
        assert_eq!(lb.next_server(&backends).unwrap().id(), c.id());
    }

    #[test]
    fn test_all_dead_or_empty() {
        let lb = RoundRobin::new();
        assert!(lb.next_server(&[]).is_none());

        let a = test_backend("http://a");
        a.set_alive(false);
        assert!(lb.next_server(&[a]).is_none());
    }
}
