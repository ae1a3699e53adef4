//! Per-logical-request scoped mutable storage (spec.md §4.6).
//!
//! A "request" here is whatever unit of work the embedding host considers
//! isolated — an HTTP request, a job, a task — not necessarily an OS
//! thread. Storage is keyed by an opaque [`RequestId`] the host assigns;
//! this crate never infers request boundaries from thread-locals itself,
//! since that tied the original implementation to a single concurrency
//! model (thread-local + `contextvars`) that async callers can't rely on.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::value::Value;

/// An opaque handle identifying one logical request's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A key/value map scoped to one request, isolated from every other
/// request's map even when probes run concurrently (spec.md §4.6).
#[derive(Debug, Default)]
struct RequestMap {
    values: Mutex<HashMap<String, Value>>,
}

/// The shared store every probe's `$req.*` reads and writes go through.
///
/// Cloning a `RequestStore` is cheap and shares the same underlying maps —
/// it is meant to be handed to every worker that might run a probe.
#[derive(Debug, Default, Clone)]
pub struct RequestStore {
    inner: std::sync::Arc<RwLock<HashMap<RequestId, std::sync::Arc<RequestMap>>>>,
}

impl RequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map_for(&self, id: RequestId) -> std::sync::Arc<RequestMap> {
        if let Some(map) = self.inner.read().expect("request store lock poisoned").get(&id) {
            return map.clone();
        }
        self.inner
            .write()
            .expect("request store lock poisoned")
            .entry(id)
            .or_insert_with(|| std::sync::Arc::new(RequestMap::default()))
            .clone()
    }

    /// Reads a value from `id`'s map. Returns `None` for a key that was
    /// never written, which the evaluator turns into `Value::Null`.
    #[must_use]
    pub fn get(&self, id: RequestId, key: &str) -> Option<Value> {
        self.map_for(id).values.lock().expect("request map lock poisoned").get(key).cloned()
    }

    pub fn set(&self, id: RequestId, key: impl Into<String>, value: Value) {
        self.map_for(id).values.lock().expect("request map lock poisoned").insert(key.into(), value);
    }

    /// Drops `id`'s entire map. Called when a request ends; a probe that
    /// races this call either sees the old map or a fresh empty one, never
    /// a torn read (spec.md §4.6 nested-independent-maps invariant).
    pub fn clear(&self, id: RequestId) {
        self.inner.write().expect("request store lock poisoned").remove(&id);
    }

    /// Runs `f` with a freshly cleared map for `id`, then clears it again
    /// on the way out — a convenience for tests and short-lived scopes.
    /// Prefer [`RequestScope`] in request-handling code, since it clears
    /// reliably even when `f` panics or returns early.
    pub fn with_request<T>(&self, id: RequestId, f: impl FnOnce(&Self) -> T) -> T {
        self.clear(id);
        let result = f(self);
        self.clear(id);
        result
    }

    /// Opens an RAII scope for `id`: storage starts empty and is cleared
    /// again when the returned guard drops.
    #[must_use]
    pub fn scope(&self, id: RequestId) -> RequestScope<'_> {
        self.clear(id);
        RequestScope { store: self, id }
    }
}

/// A guard that clears its request's storage when dropped, mirroring the
/// original implementation's `__enter__`/`__exit__` request context
/// manager but without relying on thread-locals.
#[derive(Debug)]
pub struct RequestScope<'a> {
    store: &'a RequestStore,
    id: RequestId,
}

impl RequestScope<'_> {
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(self.id, key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.store.set(self.id, key, value);
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.store.clear(self.id);
    }
}
