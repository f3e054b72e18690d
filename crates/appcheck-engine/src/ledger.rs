//! Process-wide record of the last revision handled per App.

use dashmap::DashMap;

use appcheck_core::models::app::AppKey;

/// Last processed revision per App, plus the Apps a webhook pass is
/// currently working on.
///
/// Shared by `Arc` between the webhook flow and the controller. Every
/// operation is atomic per key.
#[derive(Debug, Default)]
pub struct Ledger {
    revisions: DashMap<AppKey, u64>,
    in_flight: DashMap<AppKey, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True unless `revision` is at or below the recorded one.
    pub fn should_process(&self, key: &AppKey, revision: u64) -> bool {
        self.revisions
            .get(key)
            .is_none_or(|recorded| revision > *recorded)
    }

    /// Record a completed pass. Never moves an entry backwards.
    pub fn record(&self, key: &AppKey, revision: u64) {
        self.revisions
            .entry(key.clone())
            .and_modify(|recorded| *recorded = (*recorded).max(revision))
            .or_insert(revision);
    }

    pub fn remove(&self, key: &AppKey) {
        self.revisions.remove(key);
    }

    pub fn get(&self, key: &AppKey) -> Option<u64> {
        self.revisions.get(key).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Mark `key` as being handled until the returned guard is dropped.
    pub fn claim(&self, key: &AppKey) -> Claim<'_> {
        *self.in_flight.entry(key.clone()).or_insert(0) += 1;
        Claim {
            ledger: self,
            key: key.clone(),
        }
    }

    pub fn is_in_flight(&self, key: &AppKey) -> bool {
        self.in_flight.contains_key(key)
    }
}

/// Guard returned by [`Ledger::claim`].
#[derive(Debug)]
pub struct Claim<'a> {
    ledger: &'a Ledger,
    key: AppKey,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.ledger
            .in_flight
            .remove_if_mut(&self.key, |_, count| {
                *count -= 1;
                *count == 0
            });
    }
}
