use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use eventcrm_core::{CustomerId, OrganizerId, TagId};
use eventcrm_segments::TagMembers;
use eventcrm_tags::{AssignmentSource, Tag, TagAssignment};

use crate::error::StoreError;
use crate::store::organizer_store::{InMemoryOrganizerStore, OrganizerStore};

/// Tag definitions and (tag, customer) assignments.
///
/// Assignment inserts are idempotent: inserting an existing pair keeps the
/// original row (and its source) untouched.
#[derive(Debug, Default)]
pub struct TagStore {
    tags: InMemoryOrganizerStore<TagId, Tag>,
    assignments: RwLock<HashMap<(OrganizerId, TagId), BTreeMap<CustomerId, TagAssignment>>>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tag(&self, tag: Tag) -> Result<(), StoreError> {
        self.tags.upsert(tag.organizer_id, tag.id, tag)
    }

    /// Insert a new tag unless the organizer already has one with the same
    /// name, compared case-insensitively.
    pub fn insert_unique(&self, tag: Tag) -> Result<(), StoreError> {
        let key = tag.name.key();
        let name = tag.name.as_str().to_string();
        let inserted = self
            .tags
            .insert_unless(tag.organizer_id, tag.id, tag, |t| t.name.key() == key)?;
        if inserted {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!("tag '{name}' already exists")))
        }
    }

    pub fn get_tag(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
    ) -> Result<Option<Tag>, StoreError> {
        self.tags.get(organizer_id, &tag_id)
    }

    /// The organizer's tags ordered by name, case-insensitively.
    pub fn list_tags(&self, organizer_id: OrganizerId) -> Result<Vec<Tag>, StoreError> {
        let mut tags = self.tags.list(organizer_id)?;
        tags.sort_by(|a, b| a.name.key().cmp(&b.name.key()).then(a.id.cmp(&b.id)));
        Ok(tags)
    }

    /// Returns `true` when the pair was newly inserted.
    pub fn assign(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
        source: AssignmentSource,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut map = self.assignments.write()?;
        let members = map.entry((organizer_id, tag_id)).or_default();
        if members.contains_key(&customer_id) {
            return Ok(false);
        }
        members.insert(
            customer_id,
            TagAssignment {
                tag_id,
                customer_id,
                source,
                created_at: at,
            },
        );
        Ok(true)
    }

    /// Returns `true` when an assignment was removed.
    pub fn unassign(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
    ) -> Result<bool, StoreError> {
        let mut map = self.assignments.write()?;
        Ok(map
            .get_mut(&(organizer_id, tag_id))
            .is_some_and(|members| members.remove(&customer_id).is_some()))
    }

    pub fn assignment(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
    ) -> Result<Option<TagAssignment>, StoreError> {
        let map = self.assignments.read()?;
        Ok(map
            .get(&(organizer_id, tag_id))
            .and_then(|members| members.get(&customer_id))
            .cloned())
    }

    pub fn members(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
    ) -> Result<BTreeSet<CustomerId>, StoreError> {
        let map = self.assignments.read()?;
        Ok(map
            .get(&(organizer_id, tag_id))
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default())
    }

    /// Members of every tag of the organizer, in the shape the segment
    /// resolver expects.
    pub fn member_map(&self, organizer_id: OrganizerId) -> Result<TagMembers, StoreError> {
        let map = self.assignments.read()?;
        Ok(map
            .iter()
            .filter(|((o, _), _)| *o == organizer_id)
            .map(|((_, tag_id), members)| (*tag_id, members.keys().copied().collect()))
            .collect())
    }

    /// Tags currently held by a customer, whatever their source.
    pub fn tags_of(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> Result<BTreeSet<TagId>, StoreError> {
        let map = self.assignments.read()?;
        Ok(map
            .iter()
            .filter(|((o, _), members)| *o == organizer_id && members.contains_key(&customer_id))
            .map(|((_, tag_id), _)| *tag_id)
            .collect())
    }
}
