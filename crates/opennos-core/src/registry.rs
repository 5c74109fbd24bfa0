//! Id-indexed entity registry.
//!
//! Entities refer to each other by id, never by pointer. Every lookup goes
//! through a `Registry`, and a lookup of a missing id is an error rather
//! than a silently created default entry.

use crate::error::{CoreError, CoreResult};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

/// An ordered map from entity id to entity record.
///
/// # Example
///
/// ```
/// use opennos_core::Registry;
///
/// let mut vlans: Registry<u16, &str> = Registry::new("vlan");
/// assert!(vlans.lookup(&10).is_err());
///
/// vlans.insert(10, "users");
/// assert_eq!(vlans.lookup(&10).unwrap(), &"users");
/// ```
#[derive(Debug, Clone)]
pub struct Registry<K, V> {
    kind: &'static str,
    inner: BTreeMap<K, V>,
}

impl<K, V> Registry<K, V>
where
    K: Ord + Copy + fmt::Display,
{
    /// Creates an empty registry; `kind` names the entity in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.inner.contains_key(id)
    }

    pub fn get(&self, id: &K) -> Option<&V> {
        self.inner.get(id)
    }

    pub fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        self.inner.get_mut(id)
    }

    /// Like [`get`](Self::get), failing with `NotExists`.
    pub fn lookup(&self, id: &K) -> CoreResult<&V> {
        self.inner
            .get(id)
            .ok_or_else(|| CoreError::not_exists(self.kind, id))
    }

    /// Like [`get_mut`](Self::get_mut), failing with `NotExists`.
    pub fn lookup_mut(&mut self, id: &K) -> CoreResult<&mut V> {
        let kind = self.kind;
        self.inner
            .get_mut(id)
            .ok_or_else(|| CoreError::not_exists(kind, id))
    }

    /// Inserts a record, returning the previous one.
    pub fn insert(&mut self, id: K, value: V) -> Option<V> {
        self.inner.insert(id, value)
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        self.inner.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.inner.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, K, V> {
        self.inner.iter_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.inner.values_mut()
    }
}
