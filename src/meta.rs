//! Opaque metadata maps with prototype-style fallback.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// A shared `String → Value` map.
///
/// Reads consult this map first and then each ancestor in turn, the way
/// a shadow inode inherits metadata from the inode it was materialized
/// from. Writes always land in this map. Cloning the handle aliases the
/// same underlying storage.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    inner: Rc<RefCell<MetaInner>>,
}

#[derive(Debug, Default)]
struct MetaInner {
    values: HashMap<String, Value>,
    parent: Option<Metadata>,
}

impl Metadata {
    /// An empty map with no fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_parent(parent: Option<Metadata>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MetaInner {
                values: HashMap::new(),
                parent,
            })),
        }
    }

    /// The value for `key`, consulting ancestors on a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        match inner.values.get(key) {
            Some(value) => Some(value.clone()),
            None => inner.parent.as_ref().and_then(|p| p.get(key)),
        }
    }

    /// Whether `key` is present here or in an ancestor.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.borrow();
        inner.values.contains_key(key) || inner.parent.as_ref().is_some_and(|p| p.has(key))
    }

    /// Sets `key` in this map, masking any ancestor value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .borrow_mut()
            .values
            .insert(key.into(), value.into());
    }

    /// Removes `key` from this map only; an ancestor value, if any,
    /// becomes visible again.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.borrow_mut().values.remove(key).is_some()
    }

    /// Removes every entry of this map (ancestors are untouched).
    pub fn clear(&self) {
        self.inner.borrow_mut().values.clear();
    }

    /// Number of entries in this map, not counting ancestors.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.borrow().values.len()
    }
}
