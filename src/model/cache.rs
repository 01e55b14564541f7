//! Per-scope memoization of a whole collection.
//!
//! When installed on a [`ModelScope`](super::ModelScope), the record cache
//! intercepts unfiltered collection reads: a fresh snapshot serves lookups
//! from an identity-keyed map, and staleness is derived from the populate
//! response's freshness signal (an explicit expiry, else date plus
//! max-age, else immediately stale). Cached records are handed out marked
//! read-only.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{Model, Record};

struct CacheState<M: Model> {
    installed: bool,
    expires_at: Option<DateTime<Utc>>,
    records: BTreeMap<String, Record<M>>,
}

impl<M: Model> Default for CacheState<M> {
    fn default() -> Self {
        Self {
            installed: false,
            expires_at: None,
            records: BTreeMap::new(),
        }
    }
}

/// An identity-keyed snapshot of one collection, with a freshness window.
pub(crate) struct RecordCache<M: Model> {
    state: Mutex<CacheState<M>>,
}

impl<M: Model> RecordCache<M> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
        }
    }

    pub(crate) fn install(&self) {
        self.state.lock().expect("record cache lock").installed = true;
    }

    pub(crate) fn uninstall(&self) {
        let mut state = self.state.lock().expect("record cache lock");
        state.installed = false;
        state.expires_at = None;
        state.records.clear();
    }

    pub(crate) fn installed(&self) -> bool {
        self.state.lock().expect("record cache lock").installed
    }

    /// The full snapshot, when installed and still fresh.
    pub(crate) fn fresh_all(&self) -> Option<Vec<Record<M>>> {
        let state = self.state.lock().expect("record cache lock");
        if state.installed && is_fresh(state.expires_at) {
            Some(state.records.values().cloned().collect())
        } else {
            None
        }
    }

    /// One record by identity, when installed and still fresh. The outer
    /// `None` means the cache cannot answer; the inner option is the
    /// lookup result.
    pub(crate) fn fresh_one(&self, id_text: &str) -> Option<Option<Record<M>>> {
        let state = self.state.lock().expect("record cache lock");
        if state.installed && is_fresh(state.expires_at) {
            Some(state.records.get(id_text).cloned())
        } else {
            None
        }
    }

    /// Replaces the snapshot from a collection read. Records without an
    /// identity are not cacheable and are skipped; the rest are frozen.
    pub(crate) fn fill(&self, records: &[Record<M>], expires_at: DateTime<Utc>) {
        let mut map = BTreeMap::new();
        for record in records {
            if let Some(id) = record.id_text() {
                let mut cached = record.clone();
                cached.mark_readonly();
                map.insert(id, cached);
            }
        }
        let mut state = self.state.lock().expect("record cache lock");
        if state.installed {
            state.expires_at = Some(expires_at);
            state.records = map;
        }
    }

    /// Drops the snapshot without uninstalling, forcing a repopulate.
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock().expect("record cache lock");
        state.expires_at = None;
        state.records.clear();
    }
}

impl<M: Model> std::fmt::Debug for RecordCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("record cache lock");
        f.debug_struct("RecordCache")
            .field("installed", &state.installed)
            .field("expires_at", &state.expires_at)
            .field("records", &state.records.len())
            .finish()
    }
}

fn is_fresh(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_some_and(|deadline| deadline > Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    struct Widget;

    impl Model for Widget {
        const NAME: &'static str = "widget";
    }

    fn sample_records() -> Vec<Record<Widget>> {
        vec![
            Record::from_remote(json!({"id": 2, "name": "gear"})),
            Record::from_remote(json!({"id": 1, "name": "sprocket"})),
        ]
    }

    #[test]
    fn test_uninstalled_cache_never_answers() {
        let cache: RecordCache<Widget> = RecordCache::new();
        cache.fill(&sample_records(), Utc::now() + Duration::minutes(5));
        assert!(cache.fresh_all().is_none());
        assert!(cache.fresh_one("1").is_none());
    }

    #[test]
    fn test_fresh_snapshot_serves_sorted_readonly_records() {
        let cache: RecordCache<Widget> = RecordCache::new();
        cache.install();
        cache.fill(&sample_records(), Utc::now() + Duration::minutes(5));

        let all = cache.fresh_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(Record::readonly));

        let hit = cache.fresh_one("2").unwrap();
        assert_eq!(hit.unwrap().get("name"), Some(&json!("gear")));
        assert!(cache.fresh_one("99").unwrap().is_none());
    }

    #[test]
    fn test_expired_snapshot_stops_answering() {
        let cache: RecordCache<Widget> = RecordCache::new();
        cache.install();
        cache.fill(&sample_records(), Utc::now() - Duration::seconds(1));
        assert!(cache.fresh_all().is_none());
        assert!(cache.fresh_one("1").is_none());
    }

    #[test]
    fn test_invalidate_forces_repopulate() {
        let cache: RecordCache<Widget> = RecordCache::new();
        cache.install();
        cache.fill(&sample_records(), Utc::now() + Duration::minutes(5));
        cache.invalidate();
        assert!(cache.fresh_all().is_none());
        assert!(cache.installed());
    }
}
