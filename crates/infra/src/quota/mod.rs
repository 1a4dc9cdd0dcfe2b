//! Atomic check-and-reserve over the rolling quota window.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use eventcrm_core::{CampaignId, Channel, OrganizerId, PlanTier};
use eventcrm_quota::{QuotaGrant, QuotaStatus};

use crate::error::{QuotaError, QuotaStoreError};

pub use in_memory::InMemoryQuotaTracker;
pub use postgres::PostgresQuotaTracker;

/// Quota backend.
///
/// `try_reserve` must be atomic per (organizer, channel): concurrent callers
/// can never jointly be granted more than the tier limit inside one window.
/// The plan tier is passed in by the caller, which fetched it once for the
/// whole request.
pub trait QuotaTracker: Send + Sync {
    fn try_reserve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        campaign_id: CampaignId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaError>;

    /// Give back the reservation of a campaign that was never persisted.
    fn release(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        campaign_id: CampaignId,
    ) -> Result<(), QuotaStoreError>;

    fn status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, QuotaStoreError>;
}

impl<T> QuotaTracker for Arc<T>
where
    T: QuotaTracker + ?Sized,
{
    fn try_reserve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        campaign_id: CampaignId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaError> {
        (**self).try_reserve(organizer_id, channel, tier, campaign_id, count, now)
    }

    fn release(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        campaign_id: CampaignId,
    ) -> Result<(), QuotaStoreError> {
        (**self).release(organizer_id, channel, campaign_id)
    }

    fn status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, QuotaStoreError> {
        (**self).status(organizer_id, channel, tier, now)
    }
}
