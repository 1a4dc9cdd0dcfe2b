use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_core::{Channel, PlanTier};

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_BASIC_LIMIT: u32 = 100;
pub const DEFAULT_PRO_LIMIT: u32 = 5000;

/// Tier limits and window length. Limits apply per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub window_days: i64,
    pub basic_limit: u32,
    pub pro_limit: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            basic_limit: DEFAULT_BASIC_LIMIT,
            pro_limit: DEFAULT_PRO_LIMIT,
        }
    }
}

impl QuotaPolicy {
    pub fn limit_for(&self, tier: PlanTier, _channel: Channel) -> u32 {
        match tier {
            PlanTier::Basic => self.basic_limit,
            PlanTier::Pro => self.pro_limit,
        }
    }

    pub fn window(&self) -> TimeDelta {
        TimeDelta::days(self.window_days.max(0))
    }

    /// Oldest instant still inside the trailing window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window()
    }
}
