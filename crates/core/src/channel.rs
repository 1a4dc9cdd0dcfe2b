//! Delivery channels and subscription plan tiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marketing delivery channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Webpush,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Webpush];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Webpush => "WEBPUSH",
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Ok(Channel::Email),
            "WEBPUSH" | "WEB_PUSH" => Ok(Channel::Webpush),
            other => Err(DomainError::validation(format!(
                "unknown channel '{other}' (expected EMAIL or WEBPUSH)"
            ))),
        }
    }
}

/// Organizer subscription plan. Ordered: `Basic < Pro`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Basic,
    Pro,
}

impl PlanTier {
    /// Whether an organizer on `self` may use something that requires `required`.
    pub fn satisfies(self, required: PlanTier) -> bool {
        self >= required
    }
}
