use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use eventcrm_core::{CampaignId, Channel, OrganizerId, PlanTier};
use eventcrm_quota::{QuotaGrant, QuotaLedger, QuotaPolicy, QuotaStatus};

use crate::error::{QuotaError, QuotaStoreError};
use crate::quota::QuotaTracker;

type LedgerKey = (OrganizerId, Channel);

/// One ledger per (organizer, channel), each behind its own mutex.
///
/// The outer map lock is held only long enough to find or create the
/// ledger, so reservations for different organizers never contend.
#[derive(Debug)]
pub struct InMemoryQuotaTracker {
    policy: QuotaPolicy,
    ledgers: Mutex<HashMap<LedgerKey, Arc<Mutex<QuotaLedger>>>>,
}

impl InMemoryQuotaTracker {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            policy,
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    fn ledger(&self, key: LedgerKey) -> Result<Arc<Mutex<QuotaLedger>>, QuotaStoreError> {
        let mut ledgers = self.ledgers.lock()?;
        Ok(ledgers.entry(key).or_default().clone())
    }
}

impl Default for InMemoryQuotaTracker {
    fn default() -> Self {
        Self::new(QuotaPolicy::default())
    }
}

impl QuotaTracker for InMemoryQuotaTracker {
    fn try_reserve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        campaign_id: CampaignId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaError> {
        let ledger = self.ledger((organizer_id, channel))?;
        let mut ledger = ledger.lock().map_err(QuotaStoreError::from)?;

        let window_start = self.policy.window_start(now);
        ledger.prune(window_start);
        let limit = self.policy.limit_for(tier, channel);
        let grant = ledger.try_reserve(campaign_id, count, limit, window_start, now)?;

        debug!(
            organizer_id = %organizer_id,
            channel = %channel,
            campaign_id = %campaign_id,
            count,
            remaining = grant.remaining,
            "quota reserved"
        );
        Ok(grant)
    }

    fn release(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        campaign_id: CampaignId,
    ) -> Result<(), QuotaStoreError> {
        let ledger = self.ledger((organizer_id, channel))?;
        let mut ledger = ledger.lock()?;
        if let Some(count) = ledger.release(campaign_id) {
            debug!(
                organizer_id = %organizer_id,
                campaign_id = %campaign_id,
                count,
                "quota released"
            );
        }
        Ok(())
    }

    fn status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, QuotaStoreError> {
        let ledger = self.ledger((organizer_id, channel))?;
        let ledger = ledger.lock()?;
        Ok(ledger.status(
            self.policy.limit_for(tier, channel),
            self.policy.window_start(now),
        ))
    }
}
