//! Per-request context object.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type StoreValue = Arc<dyn Any + Send + Sync>;

/// Context for one logical request.
///
/// Cloning is cheap. The store is copy-on-write: [`ClsContext::set`] on one
/// clone is never observed by another, which is what lets a transaction
/// scope publish its handle to callees without leaking it back to the caller.
#[derive(Clone)]
pub struct ClsContext {
    id: Arc<str>,
    store: Arc<HashMap<String, StoreValue>>,
}

impl ClsContext {
    /// Create an empty context with the given id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            store: Arc::new(HashMap::new()),
        }
    }

    /// Request id of this context.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get a typed value. Returns `None` when the key is absent or holds a
    /// value of another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.store.get(key)?.clone();
        value.downcast::<T>().ok()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        Arc::make_mut(&mut self.store).insert(key.into(), Arc::new(value));
    }

    /// Builder-style [`ClsContext::set`] on a fork of this context.
    pub fn with<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Self {
        let mut child = self.fork();
        child.set(key, value);
        child
    }

    pub fn has(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if !self.store.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.store).remove(key).is_some()
    }

    /// Builder-style [`ClsContext::remove`] on a fork of this context.
    pub fn without(&self, key: &str) -> Self {
        let mut child = self.fork();
        child.remove(key);
        child
    }

    /// Child context with the same id and a snapshot of the store.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.store.keys().map(String::as_str)
    }
}

impl fmt::Debug for ClsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ClsContext")
            .field("id", &self.id)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_typed_value() {
        let mut ctx = ClsContext::new("req-1");
        ctx.set("user", "alice".to_string());
        assert_eq!(ctx.get::<String>("user").as_deref(), Some(&"alice".to_string()));
        assert!(ctx.get::<u32>("user").is_none());
        assert!(ctx.get::<String>("missing").is_none());
    }

    #[test]
    fn test_set_does_not_leak_to_earlier_clones() {
        let mut parent = ClsContext::new("req-1");
        parent.set("a", 1u32);
        let snapshot = parent.clone();
        parent.set("b", 2u32);
        assert!(parent.has("b"));
        assert!(!snapshot.has("b"));
        assert_eq!(snapshot.get::<u32>("a").as_deref(), Some(&1));
    }

    #[test]
    fn test_with_forks_and_keeps_id() {
        let parent = ClsContext::new("req-7");
        let child = parent.with("k", true);
        assert_eq!(child.id(), "req-7");
        assert!(child.has("k"));
        assert!(parent.is_empty());
    }

    #[test]
    fn test_remove_and_without() {
        let mut ctx = ClsContext::new("req-1").with("k", 1i64);
        let stripped = ctx.without("k");
        assert!(!stripped.has("k"));
        assert!(ctx.has("k"));
        assert!(ctx.remove("k"));
        assert!(!ctx.remove("k"));
        assert_eq!(ctx.len(), 0);
    }

    #[test]
    fn test_debug_lists_sorted_keys() {
        let ctx = ClsContext::new("req-1").with("b", 1u8).with("a", 2u8);
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("req-1"));
        assert!(debug.find("\"a\"").unwrap() < debug.find("\"b\"").unwrap());
    }
}
