/// Per-view request generations, used to drop results of suggestion requests
/// that a newer request for the same view has superseded.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    generation: u64,
}

/// Only views with a request in flight have an entry. Generations come from a
/// single counter, so a removed key never hands out an old value again.
#[derive(Debug, Default)]
pub struct Generations {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `key`; every earlier ticket for `key` becomes stale.
    pub fn issue(&self, key: &str) -> Ticket {
        let generation = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let mut latest = self.latest.lock().unwrap_or_else(|p| p.into_inner());
        latest.insert(key.to_string(), generation);
        Ticket {
            key: key.to_string(),
            generation,
        }
    }

    /// `true` while no newer ticket has been issued for the same key.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|p| p.into_inner());
        latest.get(&ticket.key) == Some(&ticket.generation)
    }

    /// End the request behind `ticket`. The key is dropped unless a newer
    /// request for it is still running.
    pub fn finish(&self, ticket: &Ticket) {
        let mut latest = self.latest.lock().unwrap_or_else(|p| p.into_inner());
        if latest.get(&ticket.key) == Some(&ticket.generation) {
            latest.remove(&ticket.key);
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.latest.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
