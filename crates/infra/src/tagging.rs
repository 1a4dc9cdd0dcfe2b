//! Tag management: definitions, rules and manual assignment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use eventcrm_core::{CustomerId, DomainError, OrganizerId, TagId};
use eventcrm_tags::{AssignmentSource, AutomationRule, Tag, TagColor, TagName};

use crate::error::{ServiceError, StoreError};
use crate::reconciler::{OrganizerReconcileReport, TagReconciler};
use crate::store::{CustomerStore, TagStore};

/// A tag as listed to the organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    #[serde(flatten)]
    pub tag: Tag,
    pub members: usize,
}

/// Outcome of creating a tag or changing its rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagChange {
    pub tag: Tag,
    /// Present when the rule was evaluated against the organizer's customers.
    pub reconciliation: Option<OrganizerReconcileReport>,
}

#[derive(Clone)]
pub struct TagService {
    tags: Arc<TagStore>,
    customers: Arc<CustomerStore>,
    reconciler: TagReconciler,
}

impl TagService {
    pub fn new(
        tags: Arc<TagStore>,
        customers: Arc<CustomerStore>,
        reconciler: TagReconciler,
    ) -> Self {
        Self {
            tags,
            customers,
            reconciler,
        }
    }

    #[instrument(skip(self, rule), fields(organizer_id = %organizer_id), err)]
    pub fn create_tag(
        &self,
        organizer_id: OrganizerId,
        name: &str,
        color: &str,
        rule: Option<AutomationRule>,
        now: DateTime<Utc>,
    ) -> Result<TagChange, ServiceError> {
        let name = TagName::parse(name)?;
        let color = TagColor::parse(color)?;

        let tag = Tag::new(TagId::new(), organizer_id, name, color, rule, now);
        self.tags.insert_unique(tag.clone()).map_err(|err| match err {
            StoreError::Conflict(msg) => ServiceError::from(DomainError::conflict(msg)),
            other => other.into(),
        })?;
        info!(tag_id = %tag.id, automated = tag.is_automated(), "tag created");

        let reconciliation = match tag.rule {
            Some(_) => Some(
                self.reconciler
                    .reconcile_organizer_for(organizer_id, Some(tag.id), now)?,
            ),
            None => None,
        };
        Ok(TagChange { tag, reconciliation })
    }

    /// Replace or clear a tag's rule.
    ///
    /// Clearing a rule keeps existing members: automation never removes.
    #[instrument(skip(self, rule), fields(organizer_id = %organizer_id, tag_id = %tag_id), err)]
    pub fn update_tag_rule(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        rule: Option<AutomationRule>,
        now: DateTime<Utc>,
    ) -> Result<TagChange, ServiceError> {
        let mut tag = self
            .tags
            .get_tag(organizer_id, tag_id)?
            .ok_or_else(DomainError::not_found)?;
        tag.rule = rule;
        self.tags.put_tag(tag.clone())?;

        let reconciliation = match tag.rule {
            Some(_) => Some(
                self.reconciler
                    .reconcile_organizer_for(organizer_id, Some(tag_id), now)?,
            ),
            None => None,
        };
        Ok(TagChange { tag, reconciliation })
    }

    /// Manually tag a customer. Returns `false` when already tagged.
    pub fn assign_tag(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        self.ensure_pair(organizer_id, tag_id, customer_id)?;
        Ok(self
            .tags
            .assign(organizer_id, tag_id, customer_id, AssignmentSource::Manual, now)?)
    }

    /// Returns `false` when the customer did not hold the tag.
    pub fn remove_tag(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
    ) -> Result<bool, ServiceError> {
        self.ensure_pair(organizer_id, tag_id, customer_id)?;
        let removed = self.tags.unassign(organizer_id, tag_id, customer_id)?;
        if removed {
            info!(
                organizer_id = %organizer_id,
                tag_id = %tag_id,
                customer_id = %customer_id,
                "tag removed from customer"
            );
        }
        Ok(removed)
    }

    pub fn list_tags(&self, organizer_id: OrganizerId) -> Result<Vec<TagSummary>, ServiceError> {
        let members = self.tags.member_map(organizer_id)?;
        Ok(self
            .tags
            .list_tags(organizer_id)?
            .into_iter()
            .map(|tag| TagSummary {
                members: members.get(&tag.id).map_or(0, |m| m.len()),
                tag,
            })
            .collect())
    }

    pub fn reconcile_organizer(
        &self,
        organizer_id: OrganizerId,
        now: DateTime<Utc>,
    ) -> Result<OrganizerReconcileReport, ServiceError> {
        Ok(self.reconciler.reconcile_organizer(organizer_id, now)?)
    }

    fn ensure_pair(
        &self,
        organizer_id: OrganizerId,
        tag_id: TagId,
        customer_id: CustomerId,
    ) -> Result<(), ServiceError> {
        if self.tags.get_tag(organizer_id, tag_id)?.is_none()
            || self.customers.get(organizer_id, customer_id)?.is_none()
        {
            return Err(DomainError::not_found().into());
        }
        Ok(())
    }
}
