//! Execution Context
//!
//! Associative object store a procedure reads and writes while it runs.

use crate::error::{ContextError, ContextResult};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Object stored in a context
pub type Object = Box<dyn Any + Send + Sync>;

/// Execution context
///
/// Objects are keyed by string id and retrieved by concrete type.
#[derive(Default)]
pub struct Context {
    objects: BTreeMap<String, Object>,
}

impl Context {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an object
    pub fn with_object<T>(mut self, id: impl Into<String>, object: T) -> ContextResult<Self>
    where
        T: Any + Send + Sync,
    {
        self.add_object(id, object)?;
        Ok(self)
    }

    /// Add an object under `id`
    ///
    /// Fails if an object with the same id already exists.
    pub fn add_object<T>(&mut self, id: impl Into<String>, object: T) -> ContextResult<()>
    where
        T: Any + Send + Sync,
    {
        self.add_raw_object(id.into(), Box::new(object))
    }

    /// Add an already boxed object under `id`
    pub fn add_raw_object(&mut self, id: String, object: Object) -> ContextResult<()> {
        if self.objects.contains_key(&id) {
            return Err(ContextError::DuplicateObject { id });
        }
        self.objects.insert(id, object);
        Ok(())
    }

    /// Find an object by id and type
    #[must_use]
    pub fn find_object<T: Any>(&self, id: &str) -> Option<&T> {
        self.objects.get(id).and_then(|object| object.downcast_ref::<T>())
    }

    /// Find an object by id and type for mutation
    pub fn find_object_mut<T: Any>(&mut self, id: &str) -> Option<&mut T> {
        self.objects
            .get_mut(id)
            .and_then(|object| object.downcast_mut::<T>())
    }

    /// Remove an object, returning it if present
    pub fn remove_object(&mut self, id: &str) -> Option<Object> {
        self.objects.remove(id)
    }

    /// Check whether an object with `id` exists, regardless of type
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Ids of all stored objects, sorted
    #[must_use]
    pub fn object_ids(&self) -> BTreeSet<String> {
        self.objects.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("object_ids", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}
