use nimbus_common::InstanceStatus;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks instances created by this process that have not yet been observed
/// running, so a listing pass can evict the ones that hang.
#[derive(Debug, Default)]
pub struct PendingTracker {
    entries: HashMap<String, Instant>,
}

/// Verdict for one tracked instance during a listing refresh.
#[derive(Debug, PartialEq, Eq)]
pub enum PendingVerdict {
    /// Not tracked by this process, nothing to do.
    Untracked,
    /// Still within the timeout window.
    Waiting,
    /// Reached `running`; the entry has been cleared.
    Settled,
    /// Non-running past the timeout; the caller must hard-delete it.
    Hung,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str) {
        self.entries.insert(id.to_string(), Instant::now());
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Checks one instance against the timeout, clearing the entry once the
    /// instance is running.
    pub fn check(&mut self, id: &str, status: InstanceStatus, timeout: Duration) -> PendingVerdict {
        let Some(created_at) = self.entries.get(id) else {
            return PendingVerdict::Untracked;
        };
        if status == InstanceStatus::Running {
            self.entries.remove(id);
            return PendingVerdict::Settled;
        }
        if created_at.elapsed() > timeout {
            PendingVerdict::Hung
        } else {
            PendingVerdict::Waiting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_ids_are_ignored() {
        let mut tracker = PendingTracker::new();
        assert_eq!(
            tracker.check("inst-1", InstanceStatus::Pending, Duration::from_secs(120)),
            PendingVerdict::Untracked
        );
    }

    #[test]
    fn running_clears_the_entry() {
        let mut tracker = PendingTracker::new();
        tracker.record("inst-1");
        assert_eq!(
            tracker.check("inst-1", InstanceStatus::Running, Duration::from_secs(120)),
            PendingVerdict::Settled
        );
        assert!(!tracker.contains("inst-1"));
    }

    #[test]
    fn fresh_entry_waits_and_expired_entry_hangs() {
        let mut tracker = PendingTracker::new();
        tracker.record("inst-1");
        assert_eq!(
            tracker.check("inst-1", InstanceStatus::Pending, Duration::from_secs(120)),
            PendingVerdict::Waiting
        );
        // Zero timeout makes any non-running entry overdue.
        assert_eq!(
            tracker.check("inst-1", InstanceStatus::Pending, Duration::ZERO),
            PendingVerdict::Hung
        );
        // A hung verdict leaves the entry; the caller removes it on delete.
        assert!(tracker.contains("inst-1"));
    }
}
