// Hyperlayer Variable Store
// Flat, profile-scoped integer variables with absent-means-zero reads

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

/// Key-value store of named integer variables.
///
/// Variables are created implicitly on first write and are never deleted,
/// only reset. Reading a variable that was never written yields 0.
pub trait VariableStore {
    /// Read a variable (absence ⇒ 0)
    fn get(&self, name: &str) -> i64;

    /// Write a variable
    fn set(&mut self, name: &str, value: i64);

    /// Check if a variable holds a non-zero value
    fn is_set(&self, name: &str) -> bool {
        self.get(name) != 0
    }
}

/// In-process variable store
///
/// Variables are kept in first-write order so snapshots are stable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: IndexMap<String, i64>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of variables ever written
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate variables in first-write order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Check if every variable reads as 0
    pub fn all_zero(&self) -> bool {
        self.values.values().all(|v| *v == 0)
    }

    /// Names of variables currently holding a non-zero value
    pub fn non_zero(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, v)| **v != 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl VariableStore for MemoryStore {
    fn get(&self, name: &str) -> i64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    fn set(&mut self, name: &str, value: i64) {
        match self.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

/// Handle to one store shared by several consumers of the same profile.
///
/// Clones refer to the same underlying variables.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<MemoryStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current variable set
    pub fn snapshot(&self) -> MemoryStore {
        self.inner.read().clone()
    }
}

impl VariableStore for SharedStore {
    fn get(&self, name: &str) -> i64 {
        self.inner.read().get(name)
    }

    fn set(&mut self, name: &str, value: i64) {
        self.inner.write().set(name, value);
    }
}
