//! Applies tag automation plans to stored assignments.
//!
//! Runs for one customer whenever a purchase lands, and for every customer
//! of an organizer when a tag's rule is created or changed. Runs for the same
//! organizer are serialized; different organizers proceed in parallel.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use eventcrm_core::{CustomerId, OrganizerId, TagId};
use eventcrm_tags::{plan_reconciliation, AssignmentSource, SkippedRule, Tag};

use crate::collaborators::PurchaseHistoryProvider;
use crate::error::StoreError;
use crate::store::{CustomerStore, TagStore};
use crate::sync::KeyedLocks;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub customer_id: CustomerId,
    /// Tags newly assigned by this run.
    pub added: BTreeSet<TagId>,
    pub skipped: Vec<SkippedRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizerReconcileReport {
    pub customers: usize,
    pub added: usize,
    pub skipped: Vec<SkippedRule>,
}

#[derive(Clone)]
pub struct TagReconciler {
    tags: Arc<TagStore>,
    customers: Arc<CustomerStore>,
    purchases: Arc<dyn PurchaseHistoryProvider>,
    locks: Arc<KeyedLocks<OrganizerId>>,
}

impl TagReconciler {
    pub fn new(
        tags: Arc<TagStore>,
        customers: Arc<CustomerStore>,
        purchases: Arc<dyn PurchaseHistoryProvider>,
    ) -> Self {
        Self {
            tags,
            customers,
            purchases,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Bring one customer's automated tags up to date.
    pub fn reconcile_customer(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, StoreError> {
        self.locks.with(&organizer_id, || {
            let tags = self.tags.list_tags(organizer_id)?;
            self.apply(organizer_id, customer_id, &tags, now)
        })
    }

    /// Re-evaluate every automated tag for every customer of the organizer.
    pub fn reconcile_organizer(
        &self,
        organizer_id: OrganizerId,
        now: DateTime<Utc>,
    ) -> Result<OrganizerReconcileReport, StoreError> {
        self.reconcile_organizer_for(organizer_id, None, now)
    }

    /// Organizer-wide run, optionally limited to a single tag.
    pub(crate) fn reconcile_organizer_for(
        &self,
        organizer_id: OrganizerId,
        only_tag: Option<TagId>,
        now: DateTime<Utc>,
    ) -> Result<OrganizerReconcileReport, StoreError> {
        self.locks.with(&organizer_id, || {
            let tags: Vec<Tag> = self
                .tags
                .list_tags(organizer_id)?
                .into_iter()
                .filter(|t| only_tag.is_none_or(|id| t.id == id))
                .collect();

            // Defects depend on the rule alone, not on the customer.
            let mut report = OrganizerReconcileReport {
                skipped: tags
                    .iter()
                    .filter_map(|t| {
                        let defect = t.rule.as_ref()?.defect()?;
                        Some(SkippedRule { tag_id: t.id, defect })
                    })
                    .collect(),
                ..Default::default()
            };
            for customer in self.customers.list(organizer_id)? {
                let one = self.apply_quietly(organizer_id, customer.id, &tags, now)?;
                report.customers += 1;
                report.added += one.added.len();
            }

            for skipped in &report.skipped {
                warn!(
                    organizer_id = %organizer_id,
                    tag_id = %skipped.tag_id,
                    defect = %skipped.defect,
                    "automation rule skipped"
                );
            }
            info!(
                organizer_id = %organizer_id,
                customers = report.customers,
                added = report.added,
                "tag reconciliation finished"
            );
            Ok(report)
        })
    }

    fn apply(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        tags: &[Tag],
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, StoreError> {
        let report = self.apply_quietly(organizer_id, customer_id, tags, now)?;
        for skipped in &report.skipped {
            warn!(
                organizer_id = %organizer_id,
                tag_id = %skipped.tag_id,
                defect = %skipped.defect,
                "automation rule skipped"
            );
        }
        Ok(report)
    }

    fn apply_quietly(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        tags: &[Tag],
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, StoreError> {
        let history = self.purchases.history(organizer_id, customer_id)?;
        let current = self.tags.tags_of(organizer_id, customer_id)?;
        let plan = plan_reconciliation(organizer_id, tags, &history, &current);

        let mut added = BTreeSet::new();
        for tag_id in &plan.to_add {
            if self
                .tags
                .assign(organizer_id, *tag_id, customer_id, AssignmentSource::Automation, now)?
            {
                added.insert(*tag_id);
            }
        }
        if !added.is_empty() {
            debug!(
                organizer_id = %organizer_id,
                customer_id = %customer_id,
                added = added.len(),
                "automated tags assigned"
            );
        }

        Ok(ReconcileReport {
            customer_id,
            added,
            skipped: plan.skipped,
        })
    }
}
