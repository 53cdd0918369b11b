use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::person::{PersonDescriptor, ResolvedUser, PERSON_KEY};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Zero-argument user resolution callback supplied by the host.
///
/// Returning `Ok(None)` means "no current user". Errors and panics are
/// swallowed by the enricher.
pub type PersonFn = Arc<dyn Fn() -> Result<Option<ResolvedUser>, BoxError> + Send + Sync>;

#[derive(Default)]
struct Inner {
    values: Map<String, Value>,
    person_fn: Option<PersonFn>,
}

/// Logger configuration shared between the enricher and the transport.
///
/// Cloning the handle shares the underlying state, so a person written by
/// one log call stays in place for every later call through any clone
/// until it is overwritten. Concurrent request handlers must not share one
/// instance: give each request scope its own copy with [`LoggerConfig::fork`].
#[derive(Clone, Default)]
pub struct LoggerConfig {
    inner: Arc<Mutex<Inner>>,
}

impl LoggerConfig {
    /// Empty configuration without a person callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an initial set of configuration values.
    pub fn from_values(values: Map<String, Value>) -> Self {
        let config = Self::default();
        config.lock().values = values;
        config
    }

    /// Install the user resolution callback, builder style.
    pub fn with_person_fn<F>(self, person_fn: F) -> Self
    where
        F: Fn() -> Result<Option<ResolvedUser>, BoxError> + Send + Sync + 'static,
    {
        self.set_person_fn(Some(Arc::new(person_fn)));
        self
    }

    /// Replace (or remove, with `None`) the user resolution callback.
    pub fn set_person_fn(&self, person_fn: Option<PersonFn>) {
        self.lock().person_fn = person_fn;
    }

    /// The current user resolution callback, if any.
    pub fn person_fn(&self) -> Option<PersonFn> {
        self.lock().person_fn.clone()
    }

    /// Effective configuration with `overrides` applied on top. The shared
    /// state is left untouched.
    pub fn extend(&self, overrides: Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.lock().values.clone();
        merged.extend(overrides);
        merged
    }

    /// Merge `partial` into the shared configuration key by key.
    pub fn configure(&self, partial: Map<String, Value>) {
        self.lock().values.extend(partial);
    }

    /// Sticky person currently stored in the configuration.
    ///
    /// Anything other than a non-empty mapping reads as an empty person.
    pub fn person(&self) -> PersonDescriptor {
        match self.lock().values.get(PERSON_KEY) {
            Some(Value::Object(map)) if !map.is_empty() => PersonDescriptor::from(map.clone()),
            _ => PersonDescriptor::new(),
        }
    }

    /// Independent copy of the current state for a single request scope.
    pub fn fork(&self) -> Self {
        let inner = self.lock();
        LoggerConfig {
            inner: Arc::new(Mutex::new(Inner {
                values: inner.values.clone(),
                person_fn: inner.person_fn.clone(),
            })),
        }
    }

    // A poisoned lock still holds consistent data: every write is a single
    // map operation.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("LoggerConfig")
            .field("values", &inner.values)
            .field("person_fn", &inner.person_fn.is_some())
            .finish()
    }
}
