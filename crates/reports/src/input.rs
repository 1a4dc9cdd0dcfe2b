use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_campaigns::{Campaign, CampaignStatus, DeliveryLog};
use eventcrm_core::{CampaignId, Channel, CustomerId, EventId, Purchase, TagId};

/// The slice of a campaign the aggregator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignView {
    pub id: CampaignId,
    pub name: Option<String>,
    pub channel: Channel,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    /// Event referenced by the campaign's template fields, if any.
    pub event_id: Option<EventId>,
    /// Tags the campaign targeted; empty for "all customers".
    pub target_tags: BTreeSet<TagId>,
    pub total_recipients: u32,
}

impl CampaignView {
    /// `None` for a campaign that was never created.
    pub fn of(campaign: &Campaign, target_tags: BTreeSet<TagId>) -> Option<Self> {
        Some(Self {
            id: campaign.id_typed(),
            name: campaign.name().map(str::to_string),
            channel: campaign.channel(),
            status: campaign.status(),
            created_at: campaign.created_at()?,
            event_id: campaign.fields().event_id,
            target_tags,
            total_recipients: campaign.total_recipients(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagView {
    pub id: TagId,
    pub name: String,
    pub members: BTreeSet<CustomerId>,
}

/// Everything one organizer's report is computed from.
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub campaigns: Vec<CampaignView>,
    pub deliveries: Vec<DeliveryLog>,
    pub purchases: BTreeMap<CustomerId, Vec<Purchase>>,
    pub tags: Vec<TagView>,
}

impl ReportInput {
    pub fn deliveries_of(&self, campaign_id: CampaignId) -> impl Iterator<Item = &DeliveryLog> {
        self.deliveries
            .iter()
            .filter(move |d| d.campaign_id == campaign_id)
    }

    pub fn history_of(&self, customer_id: CustomerId) -> &[Purchase] {
        self.purchases
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
