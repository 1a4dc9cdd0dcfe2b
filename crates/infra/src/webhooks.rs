//! Provider delivery webhooks.
//!
//! Webhooks carry no organizer; the row is found through the dispatch id
//! the provider returned at send time, and the row's organizer scopes
//! everything after that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use eventcrm_campaigns::{DeliveryError, DeliveryStatus, TransitionOutcome};
use eventcrm_core::{CampaignId, DeliveryLogId};
use eventcrm_events::EventBus;

use crate::dispatcher::{CampaignDispatcher, CampaignMessage, DispatchError};
use crate::error::StoreError;

/// Payload posted by the delivery provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWebhook {
    pub dispatch_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub delivery_log_id: DeliveryLogId,
    pub campaign_id: CampaignId,
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("unknown dispatch id '{0}'")]
    UnknownDispatch(String),

    #[error(transparent)]
    Status(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub struct WebhookIngestor<B> {
    dispatcher: CampaignDispatcher<B>,
}

impl<B> WebhookIngestor<B>
where
    B: EventBus<CampaignMessage>,
{
    pub fn new(dispatcher: CampaignDispatcher<B>) -> Self {
        Self { dispatcher }
    }

    /// Apply one provider event to its delivery row.
    ///
    /// Duplicates and out-of-order events come back as `Ignored` and change
    /// nothing; moves the lifecycle does not allow come back as `Rejected`.
    pub fn ingest(&self, webhook: &DeliveryWebhook) -> Result<WebhookReceipt, WebhookError> {
        let store = self.dispatcher.store();
        let row = store
            .find_by_dispatch(&webhook.dispatch_id)?
            .ok_or_else(|| WebhookError::UnknownDispatch(webhook.dispatch_id.clone()))?;
        let status = DeliveryStatus::parse_for(&webhook.event_type, row.channel)?;

        let (row, outcome) = store.transition_delivery(
            row.organizer_id,
            row.id,
            status,
            webhook.timestamp,
            webhook.error_message.as_deref(),
        )?;

        match outcome {
            TransitionOutcome::Applied { .. } => {
                self.dispatcher.settle(row.organizer_id, &row, webhook.timestamp)?;
            }
            TransitionOutcome::Ignored { current } => {
                debug!(
                    delivery_log_id = %row.id,
                    current = %current,
                    offered = %status,
                    "stale delivery webhook ignored"
                );
            }
            TransitionOutcome::Rejected { current, offered } => {
                warn!(
                    delivery_log_id = %row.id,
                    current = %current,
                    offered = %offered,
                    "delivery webhook rejected"
                );
            }
        }

        Ok(WebhookReceipt {
            delivery_log_id: row.id,
            campaign_id: row.campaign_id,
            outcome,
        })
    }
}
