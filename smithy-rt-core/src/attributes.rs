//! Typed attribute storage.
//!
//! Attributes are a heterogeneous map keyed by [`AttributeKey<T>`]. The key
//! carries the value type, so reads and writes through the same key are
//! checked at compile time.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// A named key whose values are of type `T`.
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Create a new key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

type AnyValue = Arc<dyn Any + Send + Sync>;

/// A heterogeneous map of typed attributes.
#[derive(Clone, Default)]
pub struct Attributes {
    values: HashMap<&'static str, AnyValue>,
}

impl Attributes {
    /// Create an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value stored under `key`.
    ///
    /// Returns `None` if the key is absent or holds a value of another type.
    pub fn get<T>(&self, key: &AttributeKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values
            .get(key.name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Get the value stored under `key`, failing if it holds another type.
    pub fn try_get<T>(&self, key: &AttributeKey<T>) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.values.get(key.name) {
            None => Ok(None),
            Some(v) => v
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| CoreError::attribute_type(key.name)),
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T>(&mut self, key: &AttributeKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values.insert(key.name, Arc::new(value));
    }

    /// Get the current value or insert the one produced by `f`.
    pub fn get_or_insert_with<T, F>(&mut self, key: &AttributeKey<T>, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let value = f();
        self.set(key, value.clone());
        value
    }

    /// Whether a value is stored under `key`.
    pub fn contains<T>(&self, key: &AttributeKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    /// Remove the value stored under `key`.
    pub fn remove<T>(&mut self, key: &AttributeKey<T>) {
        self.values.remove(key.name);
    }

    /// Remove and return the value stored under `key`.
    pub fn take<T>(&mut self, key: &AttributeKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.get(key);
        if value.is_some() {
            self.values.remove(key.name);
        }
        value
    }

    /// Copy every attribute from `other` into this map, overwriting on conflict.
    pub fn merge(&mut self, other: &Attributes) {
        for (name, value) in &other.values {
            self.values.insert(name, Arc::clone(value));
        }
    }

    /// Number of stored attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of all stored attributes.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Attributes").field("keys", &keys).finish()
    }
}
