//! Campaign command pipeline.
//!
//! ```text
//! load campaign -> handle command -> save (version check) -> publish events
//! ```
//!
//! Saving is an optimistic compare-and-swap on the campaign version. Worker
//! threads and webhook handlers settle the same campaign concurrently, so a
//! lost race reloads the campaign and decides again instead of failing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use eventcrm_campaigns::{
    Campaign, CampaignCommand, CampaignEvent, CampaignStatus, CreateCampaign, DeliveryLog,
    DeliveryStatus, FailCampaign, FinishCampaign, SettleRecipient,
};
use eventcrm_core::{execute, AggregateRoot, CampaignId, DomainError, ExpectedVersion, OrganizerId};
use eventcrm_events::{EventBus, EventEnvelope};
use eventcrm_segments::SegmentSelector;

use crate::error::StoreError;
use crate::store::{CampaignRecord, CampaignStore};

/// What travels on the campaign bus.
pub type CampaignMessage = EventEnvelope<CampaignEvent>;

const STREAM_TYPE: &str = "campaigns.campaign";
const MAX_ATTEMPTS: usize = 32;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt lost the version race.
    #[error("campaign {0} is too contended to update")]
    Contended(CampaignId),

    /// State was saved but the events could not be published.
    #[error("event publication failed: {0}")]
    Publish(String),

    #[error("delivery thread panicked")]
    WorkerPanicked,
}

pub struct CampaignDispatcher<B> {
    store: Arc<dyn CampaignStore>,
    bus: B,
}

impl<B: Clone> Clone for CampaignDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<B> CampaignDispatcher<B> {
    pub fn new(store: Arc<dyn CampaignStore>, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> CampaignDispatcher<B>
where
    B: EventBus<CampaignMessage>,
{
    /// Persist a new campaign together with its delivery rows.
    ///
    /// The `Created` event is published after the write; a publish failure
    /// is logged and otherwise ignored since nothing consumes it for
    /// correctness.
    pub fn create(
        &self,
        command: CreateCampaign,
        selector: SegmentSelector,
        template_code: String,
        rows: Vec<DeliveryLog>,
    ) -> Result<CampaignRecord, DispatchError> {
        let organizer_id = command.organizer_id;
        let mut campaign = Campaign::empty(command.campaign_id);
        let events = execute(&mut campaign, &CampaignCommand::Create(command))?;

        let record = CampaignRecord {
            campaign,
            selector,
            template_code,
        };
        self.store.insert(record.clone(), rows)?;

        if let Err(err) = self.publish(organizer_id, &record.campaign, &events) {
            warn!(
                organizer_id = %organizer_id,
                campaign_id = %record.campaign.id_typed(),
                error = %err,
                "failed to publish campaign creation"
            );
        }
        Ok(record)
    }

    /// Load, decide, save and publish, retrying on version conflicts.
    ///
    /// `decide` sees the freshly loaded campaign on every attempt and may
    /// return `None` when nothing needs to happen any more.
    pub fn update<F>(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
        mut decide: F,
    ) -> Result<Vec<CampaignEvent>, DispatchError>
    where
        F: FnMut(&Campaign) -> Option<CampaignCommand>,
    {
        for attempt in 0..MAX_ATTEMPTS {
            let mut campaign = self
                .store
                .get(organizer_id, campaign_id)?
                .ok_or(StoreError::NotFound("campaign"))?
                .campaign;
            let expected = ExpectedVersion::Exact(campaign.version());

            let Some(command) = decide(&campaign) else {
                return Ok(Vec::new());
            };
            let events = execute(&mut campaign, &command)?;

            match self.store.save_campaign(organizer_id, &campaign, expected) {
                Ok(()) => {
                    self.publish(organizer_id, &campaign, &events)?;
                    return Ok(events);
                }
                Err(StoreError::Conflict(msg)) => {
                    debug!(
                        campaign_id = %campaign_id,
                        attempt,
                        reason = %msg,
                        "campaign update retried"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(DispatchError::Contended(campaign_id))
    }

    /// Run one command against the current campaign state.
    pub fn dispatch(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
        command: CampaignCommand,
    ) -> Result<Vec<CampaignEvent>, DispatchError> {
        self.update(organizer_id, campaign_id, |_| Some(command.clone()))
    }

    /// Fold a changed delivery row into its campaign.
    ///
    /// Recounts `sent_count` over all rows and marks the campaign `SENT` once
    /// no row is waiting on the worker or the provider. Campaigns that are
    /// not `SENDING` are left alone.
    pub fn settle(
        &self,
        organizer_id: OrganizerId,
        row: &DeliveryLog,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let campaign_id = row.campaign_id;
        let rows = self.store.deliveries(organizer_id, campaign_id)?;
        let sent_count = u32::try_from(rows.iter().filter(|r| r.reached_recipient()).count())
            .unwrap_or(u32::MAX);
        let pending = rows.iter().any(|r| r.status.is_pending());

        let settled = self.update(organizer_id, campaign_id, |campaign| {
            (campaign.status() == CampaignStatus::Sending).then(|| {
                CampaignCommand::SettleRecipient(SettleRecipient {
                    organizer_id,
                    campaign_id,
                    delivery_log_id: row.id,
                    customer_id: row.customer_id,
                    status: row.status,
                    sent_count,
                    occurred_at: at,
                })
            })
        });
        match settled {
            // Losing the race here is harmless: the winner recounted too.
            Ok(_) | Err(DispatchError::Contended(_)) => {}
            Err(err) => return Err(err),
        }

        if pending {
            return Ok(());
        }

        let finished = self.update(organizer_id, campaign_id, |campaign| {
            (campaign.status() == CampaignStatus::Sending).then(|| {
                CampaignCommand::Finish(FinishCampaign {
                    organizer_id,
                    campaign_id,
                    sent_count,
                    occurred_at: at,
                })
            })
        })?;
        if !finished.is_empty() {
            info!(
                organizer_id = %organizer_id,
                campaign_id = %campaign_id,
                sent_count,
                total_recipients = rows.len(),
                "campaign sent"
            );
        }
        Ok(())
    }

    /// The dispatch step could not proceed: fail every row still waiting and
    /// then the campaign itself.
    pub fn fail_dispatch(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        for row in self.store.deliveries(organizer_id, campaign_id)? {
            if row.status.is_pending() {
                self.store.transition_delivery(
                    organizer_id,
                    row.id,
                    DeliveryStatus::Failed,
                    at,
                    Some(reason),
                )?;
            }
        }

        let failed = self.update(organizer_id, campaign_id, |campaign| {
            (!campaign.status().is_terminal()).then(|| {
                CampaignCommand::Fail(FailCampaign {
                    organizer_id,
                    campaign_id,
                    reason: reason.to_string(),
                    occurred_at: at,
                })
            })
        })?;
        if !failed.is_empty() {
            warn!(
                organizer_id = %organizer_id,
                campaign_id = %campaign_id,
                reason,
                "campaign failed"
            );
        }
        Ok(())
    }

    fn publish(
        &self,
        organizer_id: OrganizerId,
        campaign: &Campaign,
        events: &[CampaignEvent],
    ) -> Result<(), DispatchError> {
        let first_seq = campaign.version() - events.len() as u64 + 1;
        for (offset, event) in events.iter().enumerate() {
            let envelope = EventEnvelope::new(
                organizer_id,
                *campaign.id_typed().as_uuid(),
                STREAM_TYPE,
                first_seq + offset as u64,
                event.clone(),
            );
            self.bus
                .publish(envelope)
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}
