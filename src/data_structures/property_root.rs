//! Live simulation properties.
//!
//! The [`PropertyRoot`] is the mutable, shared counterpart of a
//! [`ConfigNode`](super::config_node::ConfigNode): values change at runtime and
//! interested parties (uniforms bound to live state, technique predicates,
//! `active` toggles) register listeners that fire on every change.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::data_structures::config_node::Value;

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

struct Registration {
    id: ListenerId,
    path: String,
    callback: Listener,
}

/// Thread-safe path → value store with change notification.
#[derive(Default)]
pub struct PropertyRoot {
    values: RwLock<HashMap<String, Value>>,
    listeners: RwLock<Vec<Registration>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for PropertyRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRoot")
            .field("values", &self.values.read().map(|v| v.len()).unwrap_or(0))
            .field("listeners", &self.listener_count())
            .finish()
    }
}

pub fn normalize_path(path: &str) -> String {
    path.trim().trim_matches('/').to_string()
}

impl PropertyRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        let values = self.values.read().ok()?;
        values.get(&normalize_path(path)).cloned()
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// Stores `value` and notifies every listener registered on `path` or on
    /// one of its ancestors. Callbacks run after the store lock is released.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        let path = normalize_path(path);
        let value = value.into();
        if let Ok(mut values) = self.values.write() {
            values.insert(path.clone(), value.clone());
        }
        let callbacks: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners
                .iter()
                .filter(|r| is_same_or_ancestor(&r.path, &path))
                .map(|r| r.callback.clone())
                .collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(&path, &value);
        }
    }

    pub fn add_listener(
        &self,
        path: &str,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(Registration {
                id,
                path: normalize_path(path),
                callback: Arc::new(callback),
            });
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.write() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|r| r.id != id);
                before != listeners.len()
            }
            Err(_) => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }
}

fn is_same_or_ancestor(ancestor: &str, path: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}
