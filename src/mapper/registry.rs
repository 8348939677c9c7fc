//! Map Function Registry
//!
//! Maps job-level map names (e.g. "word_count") to Rust functions registered
//! at deployment time. Jobs name the function they want; nothing is loaded
//! from bytes at runtime.

use crate::error::{ClusterError, Result};
use crate::job::KeyValue;

use dashmap::DashMap;
use std::sync::Arc;

/// A per-line transform: one input line in, zero or more `(key, value)` pairs out.
pub type MapFn = Arc<dyn Fn(&str) -> Vec<KeyValue> + Send + Sync>;

pub struct MapRegistry {
    functions: DashMap<String, MapFn>,
}

impl MapRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            functions: DashMap::new(),
        })
    }

    /// Creates a registry pre-loaded with the built-in functions.
    pub fn with_builtins() -> Arc<Self> {
        let registry = Self::new();
        registry.register(super::word_count::NAME, super::word_count::map_line);
        registry
    }

    /// Registers `map` under `name`, replacing any previous entry.
    pub fn register<F>(&self, name: &str, map: F)
    where
        F: Fn(&str) -> Vec<KeyValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(map));
        tracing::info!("Registered map function: {}", name);
    }

    /// Looks a function up by name.
    ///
    /// An unknown name is a configuration error: the job that asked for it
    /// cannot run anywhere in the pool.
    pub fn resolve(&self, name: &str) -> Result<MapFn> {
        match self.functions.get(name) {
            Some(entry) => Ok(entry.value().clone()),
            None => {
                let error = format!("Unknown map function: {}", name);
                tracing::error!("{}", error);
                Err(ClusterError::Configuration(error))
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }
}
