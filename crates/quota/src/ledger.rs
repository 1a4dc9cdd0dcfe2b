use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eventcrm_core::CampaignId;

/// Rejection of a reservation. Nothing was reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("quota exhausted: requested {requested}, remaining {remaining} of {limit}")]
pub struct QuotaExceeded {
    pub requested: u32,
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
}

/// A granted, all-or-nothing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaGrant {
    pub campaign_id: CampaignId,
    pub count: u32,
    pub reserved_at: DateTime<Utc>,
    /// Headroom left after this grant.
    pub remaining: u32,
    pub limit: u32,
}

/// Usage snapshot for one (organizer, channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl QuotaStatus {
    pub fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }

    /// All-or-nothing decision for `requested` more sends.
    pub fn admit(&self, requested: u32) -> Result<u32, QuotaExceeded> {
        match self.used.checked_add(requested) {
            Some(total) if total <= self.limit => Ok(self.limit - total),
            _ => Err(QuotaExceeded {
                requested,
                used: self.used,
                remaining: self.remaining,
                limit: self.limit,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    campaign_id: CampaignId,
    count: u32,
    reserved_at: DateTime<Utc>,
}

/// Reservation ledger for a single (organizer, channel).
///
/// One entry per granted campaign, stamped at reservation time. Because the
/// orchestrator creates exactly `count` delivery rows for a granted campaign,
/// the windowed sum equals the number of delivery rows created in the window.
#[derive(Debug, Clone, Default)]
pub struct QuotaLedger {
    entries: Vec<Entry>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends reserved at or after `window_start`.
    pub fn used(&self, window_start: DateTime<Utc>) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.reserved_at >= window_start)
            .fold(0u32, |acc, e| acc.saturating_add(e.count))
    }

    pub fn status(&self, limit: u32, window_start: DateTime<Utc>) -> QuotaStatus {
        QuotaStatus::new(self.used(window_start), limit)
    }

    /// Reserve `count` sends for `campaign_id` if they fit under `limit`.
    ///
    /// Reserving again for a campaign that already holds a reservation
    /// returns the existing grant instead of counting it twice.
    pub fn try_reserve(
        &mut self,
        campaign_id: CampaignId,
        count: u32,
        limit: u32,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaExceeded> {
        let status = self.status(limit, window_start);

        if let Some(existing) = self.entries.iter().find(|e| e.campaign_id == campaign_id) {
            return Ok(QuotaGrant {
                campaign_id,
                count: existing.count,
                reserved_at: existing.reserved_at,
                remaining: status.remaining,
                limit,
            });
        }

        let remaining = status.admit(count)?;
        self.entries.push(Entry {
            campaign_id,
            count,
            reserved_at: now,
        });

        Ok(QuotaGrant {
            campaign_id,
            count,
            reserved_at: now,
            remaining,
            limit,
        })
    }

    /// Give back a reservation whose campaign was never persisted.
    pub fn release(&mut self, campaign_id: CampaignId) -> Option<u32> {
        let idx = self.entries.iter().position(|e| e.campaign_id == campaign_id)?;
        Some(self.entries.swap_remove(idx).count)
    }

    /// Drop entries that can no longer fall inside any window.
    pub fn prune(&mut self, window_start: DateTime<Utc>) {
        self.entries.retain(|e| e.reserved_at >= window_start);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::QuotaPolicy;
    use chrono::{TimeDelta, TimeZone};
    use eventcrm_core::{Channel, PlanTier};
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn basic_organizer_with_95_used_cannot_send_10() {
        let policy = QuotaPolicy::default();
        let limit = policy.limit_for(PlanTier::Basic, Channel::Email);
        let now = test_time();
        let start = policy.window_start(now);

        let mut ledger = QuotaLedger::new();
        ledger
            .try_reserve(CampaignId::new(), 95, limit, start, now - TimeDelta::days(3))
            .unwrap();

        let err = ledger
            .try_reserve(CampaignId::new(), 10, limit, start, now)
            .unwrap_err();

        assert_eq!(err.remaining, 5);
        assert_eq!(err.requested, 10);
        assert_eq!(err.limit, 100);
        assert_eq!(ledger.used(start), 95);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn exact_fit_is_granted() {
        let now = test_time();
        let start = now - TimeDelta::days(30);
        let mut ledger = QuotaLedger::new();
        ledger.try_reserve(CampaignId::new(), 60, 100, start, now).unwrap();

        let grant = ledger.try_reserve(CampaignId::new(), 40, 100, start, now).unwrap();
        assert_eq!(grant.remaining, 0);
    }

    #[test]
    fn usage_rolls_out_of_the_window() {
        let policy = QuotaPolicy::default();
        let now = test_time();
        let mut ledger = QuotaLedger::new();

        let old = now - TimeDelta::days(31);
        ledger
            .try_reserve(CampaignId::new(), 100, 100, policy.window_start(old), old)
            .unwrap();

        assert_eq!(ledger.used(policy.window_start(now)), 0);
        assert!(ledger
            .try_reserve(CampaignId::new(), 100, 100, policy.window_start(now), now)
            .is_ok());

        ledger.prune(policy.window_start(now));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn release_returns_capacity() {
        let now = test_time();
        let start = now - TimeDelta::days(30);
        let mut ledger = QuotaLedger::new();
        let campaign = CampaignId::new();

        ledger.try_reserve(campaign, 100, 100, start, now).unwrap();
        assert_eq!(ledger.release(campaign), Some(100));
        assert_eq!(ledger.used(start), 0);
        assert_eq!(ledger.release(campaign), None);
    }

    #[test]
    fn re_reserving_the_same_campaign_does_not_double_count() {
        let now = test_time();
        let start = now - TimeDelta::days(30);
        let mut ledger = QuotaLedger::new();
        let campaign = CampaignId::new();

        ledger.try_reserve(campaign, 30, 100, start, now).unwrap();
        let again = ledger.try_reserve(campaign, 30, 100, start, now).unwrap();

        assert_eq!(again.count, 30);
        assert_eq!(ledger.used(start), 30);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Whatever the request sequence, granted totals stay under the limit
        /// and every rejection leaves usage untouched.
        #[test]
        fn grants_never_exceed_limit(
            requests in prop::collection::vec(0u32..60, 1..30),
            limit in 0u32..200,
        ) {
            let now = test_time();
            let start = now - TimeDelta::days(30);
            let mut ledger = QuotaLedger::new();
            let mut granted = 0u32;

            for count in requests {
                let before = ledger.used(start);
                match ledger.try_reserve(CampaignId::new(), count, limit, start, now) {
                    Ok(grant) => {
                        granted += grant.count;
                        prop_assert_eq!(grant.remaining, limit - granted);
                    }
                    Err(e) => {
                        prop_assert_eq!(ledger.used(start), before);
                        prop_assert!(e.remaining < count);
                    }
                }
            }
            prop_assert!(granted <= limit);
            prop_assert_eq!(ledger.used(start), granted);
        }
    }
}
