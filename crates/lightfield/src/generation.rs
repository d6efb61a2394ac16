use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Issues tickets for image-array loads; only the newest ticket is current.
///
/// Starting a new load supersedes every ticket handed out before it, so an
/// older load still in flight can notice and stop before it writes into a
/// buffer nobody is waiting for.
#[derive(Debug, Clone, Default)]
pub struct LoadGenerations {
    current: Arc<AtomicU64>,
}

impl LoadGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> LoadTicket {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        LoadTicket {
            generation,
            current: Arc::clone(&self.current),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Supersedes every outstanding ticket without starting a new load.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Clones share the cancel flag, so a worker holding a clone sees
/// [`LoadTicket::cancel`] from the owner.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    current: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
}

impl LoadTicket {
    /// A ticket that is never superseded, for one-off loads.
    pub fn detached() -> Self {
        LoadGenerations::new().begin()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && self.current.load(Ordering::Acquire) == self.generation
    }

    /// Supersedes this ticket and its clones only, leaving other tickets
    /// from the same [`LoadGenerations`] untouched.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_older() {
        let generations = LoadGenerations::new();
        let first = generations.begin();
        assert!(first.is_current());
        let second = generations.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        generations.cancel_all();
        assert!(!second.is_current());
    }

    #[test]
    fn cancel_reaches_clones_but_not_siblings() {
        let generations = LoadGenerations::new();
        let ticket = generations.begin();
        let worker_copy = ticket.clone();
        let detached = LoadTicket::detached();
        ticket.cancel();
        assert!(!worker_copy.is_current());
        assert!(detached.is_current());
        assert_eq!(generations.current(), ticket.generation());
    }
}
