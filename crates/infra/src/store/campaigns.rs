use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use eventcrm_campaigns::{Campaign, DeliveryLog, DeliveryStatus, TransitionOutcome};
use eventcrm_core::{AggregateRoot, CampaignId, DeliveryLogId, ExpectedVersion, OrganizerId};
use eventcrm_segments::SegmentSelector;

use crate::error::StoreError;

/// A persisted campaign plus what it was created against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRecord {
    pub campaign: Campaign,
    /// The selector the recipient list was frozen from.
    pub selector: SegmentSelector,
    /// Template code handed to the delivery provider.
    pub template_code: String,
}

/// Campaigns and their delivery rows.
///
/// `insert` writes a campaign and all of its rows in one step, so a reader
/// never sees a campaign whose `total_recipients` disagrees with its row
/// count. Row updates are per-row compare-and-swap guarded by the delivery
/// state machine.
pub trait CampaignStore: Send + Sync {
    fn insert(&self, record: CampaignRecord, rows: Vec<DeliveryLog>) -> Result<(), StoreError>;

    fn get(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignRecord>, StoreError>;

    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<CampaignRecord>, StoreError>;

    /// Replace the campaign state if the stored version still equals
    /// `expected`.
    fn save_campaign(
        &self,
        organizer_id: OrganizerId,
        campaign: &Campaign,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    fn deliveries(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryLog>, StoreError>;

    /// Every delivery row of the organizer, across campaigns.
    fn organizer_deliveries(
        &self,
        organizer_id: OrganizerId,
    ) -> Result<Vec<DeliveryLog>, StoreError>;

    fn find_by_dispatch(&self, dispatch_id: &str) -> Result<Option<DeliveryLog>, StoreError>;

    fn record_dispatch(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        dispatch_id: &str,
    ) -> Result<(), StoreError>;

    /// Offer a status to one row. The row is only written when the
    /// transition is applied.
    fn transition_delivery(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        to: DeliveryStatus,
        at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<(DeliveryLog, TransitionOutcome), StoreError>;
}

impl<S> CampaignStore for Arc<S>
where
    S: CampaignStore + ?Sized,
{
    fn insert(&self, record: CampaignRecord, rows: Vec<DeliveryLog>) -> Result<(), StoreError> {
        (**self).insert(record, rows)
    }

    fn get(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignRecord>, StoreError> {
        (**self).get(organizer_id, campaign_id)
    }

    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<CampaignRecord>, StoreError> {
        (**self).list(organizer_id)
    }

    fn save_campaign(
        &self,
        organizer_id: OrganizerId,
        campaign: &Campaign,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save_campaign(organizer_id, campaign, expected)
    }

    fn deliveries(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        (**self).deliveries(organizer_id, campaign_id)
    }

    fn organizer_deliveries(
        &self,
        organizer_id: OrganizerId,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        (**self).organizer_deliveries(organizer_id)
    }

    fn find_by_dispatch(&self, dispatch_id: &str) -> Result<Option<DeliveryLog>, StoreError> {
        (**self).find_by_dispatch(dispatch_id)
    }

    fn record_dispatch(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        dispatch_id: &str,
    ) -> Result<(), StoreError> {
        (**self).record_dispatch(organizer_id, delivery_log_id, dispatch_id)
    }

    fn transition_delivery(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        to: DeliveryStatus,
        at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<(DeliveryLog, TransitionOutcome), StoreError> {
        (**self).transition_delivery(organizer_id, delivery_log_id, to, at, error_message)
    }
}

#[derive(Debug, Default)]
struct State {
    campaigns: HashMap<(OrganizerId, CampaignId), CampaignRecord>,
    rows: HashMap<DeliveryLogId, DeliveryLog>,
    rows_by_campaign: HashMap<CampaignId, Vec<DeliveryLogId>>,
    rows_by_dispatch: HashMap<String, DeliveryLogId>,
}

impl State {
    fn row_mut(
        &mut self,
        organizer_id: OrganizerId,
        id: DeliveryLogId,
    ) -> Result<&mut DeliveryLog, StoreError> {
        self.rows
            .get_mut(&id)
            .filter(|row| row.organizer_id == organizer_id)
            .ok_or(StoreError::NotFound("delivery log"))
    }
}

/// In-memory campaign store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCampaignStore {
    state: RwLock<State>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CampaignStore for InMemoryCampaignStore {
    fn insert(&self, record: CampaignRecord, rows: Vec<DeliveryLog>) -> Result<(), StoreError> {
        let organizer_id = record
            .campaign
            .organizer_id()
            .ok_or(StoreError::NotFound("campaign"))?;
        let campaign_id = record.campaign.id_typed();

        if rows.len() != record.campaign.total_recipients() as usize {
            return Err(StoreError::Conflict(format!(
                "campaign {campaign_id} expects {} rows, got {}",
                record.campaign.total_recipients(),
                rows.len()
            )));
        }
        if rows
            .iter()
            .any(|r| r.campaign_id != campaign_id || r.organizer_id != organizer_id)
        {
            return Err(StoreError::Conflict(format!(
                "delivery rows do not belong to campaign {campaign_id}"
            )));
        }

        let mut state = self.state.write()?;
        if state.campaigns.contains_key(&(organizer_id, campaign_id)) {
            return Err(StoreError::Conflict(format!("campaign {campaign_id} already exists")));
        }

        let ids: Vec<DeliveryLogId> = rows.iter().map(|r| r.id).collect();
        for row in rows {
            state.rows.insert(row.id, row);
        }
        state.rows_by_campaign.insert(campaign_id, ids);
        state.campaigns.insert((organizer_id, campaign_id), record);
        Ok(())
    }

    fn get(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignRecord>, StoreError> {
        let state = self.state.read()?;
        Ok(state.campaigns.get(&(organizer_id, campaign_id)).cloned())
    }

    fn list(&self, organizer_id: OrganizerId) -> Result<Vec<CampaignRecord>, StoreError> {
        let state = self.state.read()?;
        Ok(state
            .campaigns
            .iter()
            .filter(|((o, _), _)| *o == organizer_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn save_campaign(
        &self,
        organizer_id: OrganizerId,
        campaign: &Campaign,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write()?;
        let record = state
            .campaigns
            .get_mut(&(organizer_id, campaign.id_typed()))
            .ok_or(StoreError::NotFound("campaign"))?;

        let actual = record.campaign.version();
        if !expected.matches(actual) {
            return Err(StoreError::Conflict(format!(
                "campaign {} moved on (expected {expected:?}, actual {actual})",
                campaign.id_typed()
            )));
        }
        record.campaign = campaign.clone();
        Ok(())
    }

    fn deliveries(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        let state = self.state.read()?;
        if !state.campaigns.contains_key(&(organizer_id, campaign_id)) {
            return Ok(Vec::new());
        }
        Ok(state
            .rows_by_campaign
            .get(&campaign_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.rows.get(id).cloned())
            .collect())
    }

    fn organizer_deliveries(
        &self,
        organizer_id: OrganizerId,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        let state = self.state.read()?;
        let mut rows: Vec<DeliveryLog> = state
            .rows
            .values()
            .filter(|r| r.organizer_id == organizer_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    fn find_by_dispatch(&self, dispatch_id: &str) -> Result<Option<DeliveryLog>, StoreError> {
        let state = self.state.read()?;
        Ok(state
            .rows_by_dispatch
            .get(dispatch_id)
            .and_then(|id| state.rows.get(id))
            .cloned())
    }

    fn record_dispatch(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        dispatch_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write()?;
        if let Some(owner) = state.rows_by_dispatch.get(dispatch_id) {
            if *owner != delivery_log_id {
                return Err(StoreError::Conflict(format!(
                    "dispatch id {dispatch_id} already belongs to another row"
                )));
            }
        }
        let row = state.row_mut(organizer_id, delivery_log_id)?;
        row.dispatch_id = Some(dispatch_id.to_string());
        state
            .rows_by_dispatch
            .insert(dispatch_id.to_string(), delivery_log_id);
        Ok(())
    }

    fn transition_delivery(
        &self,
        organizer_id: OrganizerId,
        delivery_log_id: DeliveryLogId,
        to: DeliveryStatus,
        at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<(DeliveryLog, TransitionOutcome), StoreError> {
        let mut state = self.state.write()?;
        let row = state.row_mut(organizer_id, delivery_log_id)?;
        let outcome = row.transition(to, at, error_message);
        Ok((row.clone(), outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventcrm_campaigns::{CampaignCommand, CreateCampaign, DynamicFields};
    use eventcrm_core::{execute, Channel, CustomerId, TemplateId};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    }

    fn created(org: OrganizerId, total: u32) -> Campaign {
        let id = CampaignId::new();
        let mut campaign = Campaign::empty(id);
        execute(
            &mut campaign,
            &CampaignCommand::Create(CreateCampaign {
                organizer_id: org,
                campaign_id: id,
                channel: Channel::Email,
                template_id: TemplateId::new(),
                name: None,
                fields: DynamicFields::default(),
                total_recipients: total,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        campaign
    }

    fn rows_for(campaign: &Campaign, n: usize) -> Vec<DeliveryLog> {
        (0..n)
            .map(|i| {
                DeliveryLog::queued(
                    campaign.organizer_id().unwrap(),
                    campaign.id_typed(),
                    CustomerId::new(),
                    Channel::Email,
                    format!("c{i}@example.com"),
                    test_time(),
                )
            })
            .collect()
    }

    fn record(campaign: Campaign) -> CampaignRecord {
        CampaignRecord {
            campaign,
            selector: SegmentSelector::All,
            template_code: "welcome".into(),
        }
    }

    #[test]
    fn insert_requires_one_row_per_recipient() {
        let store = InMemoryCampaignStore::new();
        let org = OrganizerId::new();
        let campaign = created(org, 3);
        let short = rows_for(&campaign, 2);

        assert!(matches!(
            store.insert(record(campaign.clone()), short),
            Err(StoreError::Conflict(_))
        ));
        assert!(store.get(org, campaign.id_typed()).unwrap().is_none());

        let rows = rows_for(&campaign, 3);
        store.insert(record(campaign.clone()), rows).unwrap();
        assert_eq!(store.deliveries(org, campaign.id_typed()).unwrap().len(), 3);
    }

    #[test]
    fn stale_saves_are_conflicts() {
        let store = InMemoryCampaignStore::new();
        let org = OrganizerId::new();
        let campaign = created(org, 1);
        let rows = rows_for(&campaign, 1);
        store.insert(record(campaign.clone()), rows).unwrap();

        store
            .save_campaign(org, &campaign, ExpectedVersion::Exact(campaign.version()))
            .unwrap();
        let err = store
            .save_campaign(org, &campaign, ExpectedVersion::Exact(campaign.version() + 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn rows_are_found_by_dispatch_id_and_guarded_by_organizer() {
        let store = InMemoryCampaignStore::new();
        let org = OrganizerId::new();
        let campaign = created(org, 1);
        let rows = rows_for(&campaign, 1);
        let row_id = rows[0].id;
        store.insert(record(campaign), rows).unwrap();

        store.record_dispatch(org, row_id, "msg-1").unwrap();
        let found = store.find_by_dispatch("msg-1").unwrap().unwrap();
        assert_eq!(found.id, row_id);

        let err = store
            .transition_delivery(
                OrganizerId::new(),
                row_id,
                DeliveryStatus::Processing,
                test_time(),
                None,
            )
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("delivery log"));

        let (row, outcome) = store
            .transition_delivery(org, row_id, DeliveryStatus::Processing, test_time(), None)
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(row.status, DeliveryStatus::Processing);
    }
}
