use std::sync::RwLock;

use serde_json::{Map, Value};

/// Read access to the current request's session.
pub trait SessionStore: Send + Sync {
    /// Snapshot of every key/value pair in the session. Empty when there is
    /// no active session.
    fn all(&self) -> Map<String, Value>;

    /// The session's own identifier.
    fn id(&self) -> String;
}

/// In-process session store, handy for hosts without a session layer of
/// their own and for tests.
#[derive(Debug, Default)]
pub struct MemorySession {
    id: String,
    data: RwLock<Map<String, Value>>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        MemorySession {
            id: id.into(),
            data: RwLock::new(Map::new()),
        }
    }

    pub fn with_data(id: impl Into<String>, data: Map<String, Value>) -> Self {
        MemorySession {
            id: id.into(),
            data: RwLock::new(data),
        }
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        let mut data = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        data.insert(key.into(), value);
    }

    pub fn forget(&self, key: &str) {
        let mut data = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        data.remove(key);
    }
}

impl SessionStore for MemorySession {
    fn all(&self) -> Map<String, Value> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}
