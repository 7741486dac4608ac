//! Registry of thread names
//!
//! Maps thread ids to interned names. One registry is created per engine and
//! shared by reference with every component that spawns threads, instead of
//! living in a process-wide singleton.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Called on the named thread right after its name is set
pub type SetNameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Thread id ↔ name registry
pub struct ThreadNameRegistry {
    /// Thread id to interned name
    names: DashMap<ThreadId, Arc<str>>,

    /// Every name ever set, so repeated names share one allocation
    interned: DashMap<String, Arc<str>>,

    set_name_callback: RwLock<Option<SetNameCallback>>,
}

impl ThreadNameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            names: DashMap::new(),
            interned: DashMap::new(),
            set_name_callback: RwLock::new(None),
        }
    }

    /// Install a callback invoked whenever a thread sets its name
    pub fn install_set_name_callback(&self, callback: SetNameCallback) {
        *self.set_name_callback.write() = Some(callback);
    }

    /// Set the name of the calling thread
    pub fn set_name_for_current_thread(&self, name: &str) {
        let interned = self.intern(name);
        self.names.insert(thread::current().id(), interned.clone());

        let callback = self.set_name_callback.read().clone();
        if let Some(callback) = callback {
            callback(&interned);
        }
    }

    /// Name registered for `id`
    pub fn name_of(&self, id: ThreadId) -> Option<Arc<str>> {
        self.names.get(&id).map(|entry| entry.value().clone())
    }

    /// Name registered for the calling thread, or the empty string
    pub fn name_for_current_thread(&self) -> Arc<str> {
        self.name_of(thread::current().id())
            .unwrap_or_else(|| self.intern(""))
    }

    /// Forget the name of `id`. The interned string stays alive.
    pub fn remove(&self, id: ThreadId) -> bool {
        self.names.remove(&id).is_some()
    }

    /// Forget the name of the calling thread
    pub fn remove_current_thread(&self) -> bool {
        self.remove(thread::current().id())
    }

    /// Number of named threads
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no thread is named
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn intern(&self, name: &str) -> Arc<str> {
        if let Some(existing) = self.interned.get(name) {
            return existing.value().clone();
        }
        self.interned
            .entry(name.to_string())
            .or_insert_with(|| Arc::from(name))
            .value()
            .clone()
    }
}

impl Default for ThreadNameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_set_and_get_name() {
        let registry = ThreadNameRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(&*registry.name_for_current_thread(), "");

        registry.set_name_for_current_thread("main");
        assert_eq!(&*registry.name_for_current_thread(), "main");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_per_thread() {
        let registry = Arc::new(ThreadNameRegistry::new());
        registry.set_name_for_current_thread("main");

        let r = registry.clone();
        let other_id = thread::spawn(move || {
            r.set_name_for_current_thread("helper");
            thread::current().id()
        })
        .join()
        .unwrap();

        assert_eq!(registry.name_of(other_id).as_deref(), Some("helper"));
        assert_eq!(&*registry.name_for_current_thread(), "main");
        assert!(registry.remove(other_id));
        assert!(registry.name_of(other_id).is_none());
    }

    #[test]
    fn test_names_are_interned() {
        let registry = ThreadNameRegistry::new();
        registry.set_name_for_current_thread("worker");
        let first = registry.name_for_current_thread();
        registry.set_name_for_current_thread("worker");
        let second = registry.name_for_current_thread();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_set_name_callback() {
        let registry = ThreadNameRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        registry.install_set_name_callback(Arc::new(move |name| s.lock().push(name.to_string())));

        registry.set_name_for_current_thread("io");
        assert_eq!(*seen.lock(), vec!["io".to_string()]);
    }

    #[test]
    fn test_remove_current_thread() {
        let registry = ThreadNameRegistry::new();
        assert!(!registry.remove_current_thread());
        registry.set_name_for_current_thread("temp");
        assert!(registry.remove_current_thread());
        assert!(registry.is_empty());
    }
}
