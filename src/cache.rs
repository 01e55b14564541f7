//! Memoization of idempotent operation results.
//!
//! A [`ResourceCache`] remembers prior GET/HEAD results keyed by
//! `(url, headers)`. It is an explicit handle, scoped to one logical unit
//! of work (a request, a task) and passed into the pipeline; there is no
//! process-global cache. Any unsafe verb clears the whole cache before
//! executing, whether or not caching is enabled.
//!
//! [`CacheScope`] is the request-scoped guard: it enables the cache for
//! the duration of a scope and, on drop, clears it and restores the prior
//! enablement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::handler::OperationResult;

type HeaderKey = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct CacheState {
    enabled: bool,
    store: HashMap<String, HashMap<HeaderKey, OperationResult>>,
}

/// A per-scope memo of safe-verb operation results.
///
/// Interior mutability keeps the handle shareable across the adapters of
/// one unit of work; access is last-writer-wins, which is sufficient for
/// the confined scope.
#[derive(Debug, Default)]
pub struct ResourceCache {
    state: Mutex<CacheState>,
}

impl ResourceCache {
    /// Creates a cache, initially disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether cached lookups are currently enabled.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock was poisoned.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().expect("cache lock").enabled
    }

    /// Enables cached lookups for safe verbs.
    pub fn enable(&self) {
        self.state.lock().expect("cache lock").enabled = true;
    }

    /// Disables cached lookups without discarding stored entries.
    pub fn disable(&self) {
        self.state.lock().expect("cache lock").enabled = false;
    }

    /// Discards every stored entry.
    pub fn clear(&self) {
        self.state.lock().expect("cache lock").store.clear();
    }

    /// Returns the stored result for `(url, headers)`, if present.
    ///
    /// The stored value is defensively cloned on the way out.
    #[must_use]
    pub fn lookup(&self, url: &str, headers: &HeaderKey) -> Option<OperationResult> {
        self.state
            .lock()
            .expect("cache lock")
            .store
            .get(url)
            .and_then(|by_headers| by_headers.get(headers))
            .cloned()
    }

    /// Stores a result under `(url, headers)`.
    pub fn store(&self, url: &str, headers: &HeaderKey, result: &OperationResult) {
        self.state
            .lock()
            .expect("cache lock")
            .store
            .entry(url.to_string())
            .or_default()
            .insert(headers.clone(), result.clone());
    }
}

/// Whether the scope guard enabled or disabled caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeMode {
    Enabled,
    Disabled,
}

/// Guard scoping cache enablement to one unit of work.
///
/// [`CacheScope::cached`] enables the cache and, on drop, clears it and
/// restores the previous enablement (the middleware contract).
/// [`CacheScope::uncached`] disables lookups for the scope without
/// touching stored entries.
#[derive(Debug)]
pub struct CacheScope<'a> {
    cache: &'a ResourceCache,
    previous: bool,
    mode: ScopeMode,
}

impl<'a> CacheScope<'a> {
    /// Enables caching for the scope.
    #[must_use]
    pub fn cached(cache: &'a ResourceCache) -> Self {
        let previous = cache.is_enabled();
        cache.enable();
        Self {
            cache,
            previous,
            mode: ScopeMode::Enabled,
        }
    }

    /// Disables caching for the scope.
    #[must_use]
    pub fn uncached(cache: &'a ResourceCache) -> Self {
        let previous = cache.is_enabled();
        cache.disable();
        Self {
            cache,
            previous,
            mode: ScopeMode::Disabled,
        }
    }
}

impl Drop for CacheScope<'_> {
    fn drop(&mut self) {
        if self.mode == ScopeMode::Enabled {
            self.cache.clear();
        }
        if self.previous {
            self.cache.enable();
        } else {
            self.cache.disable();
        }
    }
}
