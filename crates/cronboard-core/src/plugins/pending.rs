//! In-flight tracking for per-plugin calls
//!
//! Lets a caller disable a trigger while a call for the same plugin is
//! outstanding. Tracking never blocks a second call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<Mutex<HashMap<String, usize>>>,
}

impl PendingSet {
    pub fn begin(&self, key: &str) -> PendingGuard {
        *self.inner.lock().entry(key.to_string()).or_insert(0) += 1;
        PendingGuard {
            set: Arc::clone(&self.inner),
            key: key.to_string(),
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    #[cfg(test)]
    fn pending(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Marks a key in flight until dropped
#[derive(Debug)]
pub struct PendingGuard {
    set: Arc<Mutex<HashMap<String, usize>>>,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock();
        if let Some(count) = set.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                set.remove(&self.key);
            }
        }
    }
}
