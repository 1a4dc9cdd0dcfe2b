//! Gathers an organizer's data and hands it to the report aggregator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use eventcrm_core::OrganizerId;
use eventcrm_reports::{
    build_report, Benchmarks, CampaignView, Report, ReportFilters, ReportInput, TagView,
};

use crate::collaborators::PurchaseHistoryProvider;
use crate::error::StoreError;
use crate::store::{CampaignStore, CustomerStore, TagStore};

#[derive(Clone)]
pub struct ReportService {
    campaigns: Arc<dyn CampaignStore>,
    customers: Arc<CustomerStore>,
    tags: Arc<TagStore>,
    purchases: Arc<dyn PurchaseHistoryProvider>,
    benchmarks: Benchmarks,
}

impl ReportService {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        customers: Arc<CustomerStore>,
        tags: Arc<TagStore>,
        purchases: Arc<dyn PurchaseHistoryProvider>,
        benchmarks: Benchmarks,
    ) -> Self {
        Self {
            campaigns,
            customers,
            tags,
            purchases,
            benchmarks,
        }
    }

    #[instrument(skip(self, filters), fields(organizer_id = %organizer_id), err)]
    pub fn report(
        &self,
        organizer_id: OrganizerId,
        filters: &ReportFilters,
        now: DateTime<Utc>,
    ) -> Result<Report, StoreError> {
        let input = self.gather(organizer_id)?;
        Ok(build_report(&input, filters, &self.benchmarks, now))
    }

    fn gather(&self, organizer_id: OrganizerId) -> Result<ReportInput, StoreError> {
        let campaigns = self
            .campaigns
            .list(organizer_id)?
            .iter()
            .filter_map(|record| {
                let targets = record.selector.tag_ids().cloned().unwrap_or_default();
                CampaignView::of(&record.campaign, targets)
            })
            .collect();

        let mut purchases = BTreeMap::new();
        for customer in self.customers.list(organizer_id)? {
            let history = self.purchases.history(organizer_id, customer.id)?;
            if !history.is_empty() {
                purchases.insert(customer.id, history);
            }
        }

        let members = self.tags.member_map(organizer_id)?;
        let tags = self
            .tags
            .list_tags(organizer_id)?
            .into_iter()
            .map(|tag| TagView {
                members: members.get(&tag.id).cloned().unwrap_or_else(BTreeSet::new),
                name: tag.name.as_str().to_string(),
                id: tag.id,
            })
            .collect();

        Ok(ReportInput {
            campaigns,
            deliveries: self.campaigns.organizer_deliveries(organizer_id)?,
            purchases,
            tags,
        })
    }
}
