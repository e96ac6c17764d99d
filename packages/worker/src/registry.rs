//! Queue registry for resolving queues by name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use queue_core::{Queue, QueueError};

/// Builds a queue the first time its name is resolved.
pub type QueueFactory = Arc<dyn Fn() -> Result<Arc<dyn Queue>, QueueError> + Send + Sync>;

/// Registry lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Failed to build queue '{name}'")]
    Factory {
        name: String,
        #[source]
        source: QueueError,
    },
}

enum Entry {
    Ready(Arc<dyn Queue>),
    Factory(QueueFactory),
}

/// Name to queue map, built at startup and handed to workers.
///
/// Queues registered through a factory are built on first resolve and
/// cached from then on.
pub struct QueueRegistry {
    queues: RwLock<HashMap<String, Entry>>,
}

impl QueueRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Register a queue instance, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, queue: Arc<dyn Queue>) {
        self.write().insert(name.into(), Entry::Ready(queue));
    }

    /// Register a queue built lazily on first resolve.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Queue>, QueueError> + Send + Sync + 'static,
    {
        self.write()
            .insert(name.into(), Entry::Factory(Arc::new(factory)));
    }

    /// Unregister a queue. Returns `false` if the name was unknown.
    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// List all registered queue names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get a queue by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Queue>, RegistryError> {
        let factory = match self.read().get(name) {
            Some(Entry::Ready(queue)) => return Ok(queue.clone()),
            Some(Entry::Factory(factory)) => factory.clone(),
            None => return Err(RegistryError::QueueNotFound(name.to_string())),
        };

        // Build outside the lock; factories may be slow.
        let queue = factory().map_err(|source| RegistryError::Factory {
            name: name.to_string(),
            source,
        })?;
        tracing::debug!("Built queue '{}' from factory", name);

        let mut queues = self.write();
        match queues.get(name) {
            // Another caller won the race; keep its instance.
            Some(Entry::Ready(existing)) => Ok(existing.clone()),
            Some(Entry::Factory(_)) => {
                queues.insert(name.to_string(), Entry::Ready(queue.clone()));
                Ok(queue)
            }
            // Unregistered while building.
            None => Ok(queue),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.queues.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.queues.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.names())
            .finish()
    }
}
