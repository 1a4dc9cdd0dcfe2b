use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use eventcrm_core::OrganizerId;

use crate::error::StoreError;

/// Organizer-isolated key/value store.
///
/// Every operation names the organizer; there is no way to read or list
/// another organizer's records through this interface.
pub trait OrganizerStore<K, V>: Send + Sync {
    fn get(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError>;
    fn upsert(&self, organizer_id: OrganizerId, key: K, value: V) -> Result<(), StoreError>;
    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<V>, StoreError>;
    fn remove(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError>;
}

impl<K, V, S> OrganizerStore<K, V> for Arc<S>
where
    S: OrganizerStore<K, V> + ?Sized,
{
    fn get(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(organizer_id, key)
    }

    fn upsert(&self, organizer_id: OrganizerId, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(organizer_id, key, value)
    }

    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<V>, StoreError> {
        (**self).list(organizer_id)
    }

    fn remove(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError> {
        (**self).remove(organizer_id, key)
    }
}

/// In-memory organizer-isolated store.
#[derive(Debug)]
pub struct InMemoryOrganizerStore<K, V> {
    inner: RwLock<HashMap<(OrganizerId, K), V>>,
}

impl<K, V> InMemoryOrganizerStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryOrganizerStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryOrganizerStore<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Mutate a record in place under the write lock.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    pub fn update<R>(
        &self,
        organizer_id: OrganizerId,
        key: &K,
        f: impl FnOnce(&mut V) -> R,
    ) -> Result<Option<R>, StoreError> {
        let mut map = self.inner.write()?;
        Ok(map.get_mut(&(organizer_id, key.clone())).map(f))
    }

    /// Insert `value` unless one of the organizer's records clashes with it.
    ///
    /// The scan and the insert share one write lock. Returns `false`, and
    /// leaves the store untouched, when `clashes` matched.
    pub fn insert_unless(
        &self,
        organizer_id: OrganizerId,
        key: K,
        value: V,
        clashes: impl Fn(&V) -> bool,
    ) -> Result<bool, StoreError> {
        let mut map = self.inner.write()?;
        if map
            .iter()
            .any(|((o, _), existing)| *o == organizer_id && clashes(existing))
        {
            return Ok(false);
        }
        map.insert((organizer_id, key), value);
        Ok(true)
    }

    /// Insert `value`, or merge it into the existing record under the write
    /// lock. Returns the stored record.
    pub fn upsert_with(
        &self,
        organizer_id: OrganizerId,
        key: K,
        mut value: V,
        merge: impl FnOnce(&V, &mut V),
    ) -> Result<V, StoreError>
    where
        V: Clone,
    {
        let mut map = self.inner.write()?;
        let slot = (organizer_id, key);
        if let Some(existing) = map.get(&slot) {
            merge(existing, &mut value);
        }
        map.insert(slot, value.clone());
        Ok(value)
    }
}

impl<K, V> OrganizerStore<K, V> for InMemoryOrganizerStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read()?;
        Ok(map.get(&(organizer_id, key.clone())).cloned())
    }

    fn upsert(&self, organizer_id: OrganizerId, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write()?;
        map.insert((organizer_id, key), value);
        Ok(())
    }

    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read()?;
        Ok(map
            .iter()
            .filter_map(|((o, _k), v)| (*o == organizer_id).then(|| v.clone()))
            .collect())
    }

    fn remove(&self, organizer_id: OrganizerId, key: &K) -> Result<Option<V>, StoreError> {
        let mut map = self.inner.write()?;
        Ok(map.remove(&(organizer_id, key.clone())))
    }
}
