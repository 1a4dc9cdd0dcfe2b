//! Per-recipient delivery state machine.
//!
//! Status updates are compare-and-swap against a rank table rather than
//! timestamp-ordered: webhooks arrive at least once and out of order, so an
//! update whose rank is not above the current one is a silent no-op.
//!
//! ```text
//! EMAIL    QUEUED -> PROCESSING -> DELIVERED -> OPENED -> CLICKED
//!                              \-> BOUNCED | FAILED
//!          any -> COMPLAINED | UNSUBSCRIBED
//! WEBPUSH  QUEUED -> PROCESSING -> SENT | FAILED
//! ```

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eventcrm_core::{CampaignId, Channel, CustomerId, DeliveryLogId, OrganizerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Queued,
    Processing,
    Delivered,
    Bounced,
    Failed,
    Opened,
    Clicked,
    Complained,
    Unsubscribed,
    /// Web-push only: the provider accepted the notification.
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("unknown delivery status '{0}'")]
    UnknownStatus(String),

    #[error("status {status} does not exist on channel {channel}")]
    NotForChannel {
        status: DeliveryStatus,
        channel: Channel,
    },
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "QUEUED",
            DeliveryStatus::Processing => "PROCESSING",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Bounced => "BOUNCED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Opened => "OPENED",
            DeliveryStatus::Clicked => "CLICKED",
            DeliveryStatus::Complained => "COMPLAINED",
            DeliveryStatus::Unsubscribed => "UNSUBSCRIBED",
            DeliveryStatus::Sent => "SENT",
        }
    }

    pub fn exists_on(self, channel: Channel) -> bool {
        use DeliveryStatus::*;
        match channel {
            Channel::Email => !matches!(self, Sent),
            Channel::Webpush => matches!(self, Queued | Processing | Sent | Failed),
        }
    }

    /// Position in the forward order for `channel`.
    pub fn rank(self, channel: Channel) -> Option<u8> {
        use DeliveryStatus::*;
        if !self.exists_on(channel) {
            return None;
        }
        Some(match self {
            Queued => 0,
            Processing => 1,
            Delivered | Bounced | Failed | Sent => 2,
            Opened => 3,
            Clicked => 4,
            Complained | Unsubscribed => 5,
        })
    }

    /// Direct successors in the lifecycle graph.
    fn successors(self, channel: Channel) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match channel {
            Channel::Email => match self {
                Queued => &[Processing, Failed, Complained, Unsubscribed],
                Processing => &[Delivered, Bounced, Failed, Complained, Unsubscribed],
                Delivered => &[Opened, Complained, Unsubscribed],
                Opened => &[Clicked, Complained, Unsubscribed],
                Clicked | Bounced | Failed => &[Complained, Unsubscribed],
                Complained | Unsubscribed | Sent => &[],
            },
            Channel::Webpush => match self {
                Queued => &[Processing, Failed],
                Processing => &[Sent, Failed],
                _ => &[],
            },
        }
    }

    /// Whether `to` can be reached from `self` by moving forward.
    pub fn can_reach(self, to: DeliveryStatus, channel: Channel) -> bool {
        self.successors(channel)
            .iter()
            .any(|next| *next == to || next.can_reach(to, channel))
    }

    /// Still waiting on the worker or the provider.
    pub fn is_pending(self) -> bool {
        matches!(self, DeliveryStatus::Queued | DeliveryStatus::Processing)
    }

    /// Parse a provider event name and check it belongs to `channel`.
    pub fn parse_for(raw: &str, channel: Channel) -> Result<Self, DeliveryError> {
        let status: DeliveryStatus = raw.parse()?;
        if !status.exists_on(channel) {
            return Err(DeliveryError::NotForChannel { status, channel });
        }
        Ok(status)
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use DeliveryStatus::*;
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Queued,
            "PROCESSING" => Processing,
            "DELIVERED" | "DELIVERY" => Delivered,
            "BOUNCED" | "BOUNCE" => Bounced,
            "FAILED" => Failed,
            "OPENED" | "OPEN" => Opened,
            "CLICKED" | "CLICK" => Clicked,
            "COMPLAINED" | "COMPLAINT" => Complained,
            "UNSUBSCRIBED" | "UNSUBSCRIBE" => Unsubscribed,
            "SENT" => Sent,
            _ => return Err(DeliveryError::UnknownStatus(s.to_string())),
        })
    }
}

/// Result of offering a status to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// Row is already at an equal or later stage.
    Ignored { current: DeliveryStatus },
    /// Not reachable from the current status (or not valid on the channel).
    Rejected {
        current: DeliveryStatus,
        offered: DeliveryStatus,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// One row per (campaign, customer). Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: DeliveryLogId,
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub customer_id: CustomerId,
    pub channel: Channel,
    /// Email address or push endpoint captured at creation.
    pub address: String,
    pub status: DeliveryStatus,
    pub dispatch_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl DeliveryLog {
    pub fn queued(
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
        customer_id: CustomerId,
        channel: Channel,
        address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryLogId::new(),
            organizer_id,
            campaign_id,
            customer_id,
            channel,
            address: address.into(),
            status: DeliveryStatus::Queued,
            dispatch_id: None,
            error_message: None,
            created_at,
            updated_at: created_at,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
        }
    }

    /// Reached the recipient (delivered on email, accepted on web-push).
    pub fn reached_recipient(&self) -> bool {
        self.delivered_at.is_some()
    }

    /// Offer `to` to this row.
    ///
    /// Lower or equal rank is ignored. A move the lifecycle graph does not
    /// allow is rejected and leaves the row untouched. `error_message` is
    /// stored verbatim for `FAILED`/`BOUNCED`.
    pub fn transition(
        &mut self,
        to: DeliveryStatus,
        at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> TransitionOutcome {
        let current = self.status;
        let (Some(from_rank), Some(to_rank)) = (current.rank(self.channel), to.rank(self.channel))
        else {
            return TransitionOutcome::Rejected {
                current,
                offered: to,
            };
        };

        if to_rank <= from_rank {
            return TransitionOutcome::Ignored { current };
        }
        if !current.can_reach(to, self.channel) {
            return TransitionOutcome::Rejected {
                current,
                offered: to,
            };
        }

        match to {
            DeliveryStatus::Delivered | DeliveryStatus::Sent => {
                self.delivered_at.get_or_insert(at);
            }
            DeliveryStatus::Opened => {
                self.delivered_at.get_or_insert(at);
                self.opened_at.get_or_insert(at);
            }
            DeliveryStatus::Clicked => {
                // A click implies the message was delivered and opened.
                self.delivered_at.get_or_insert(at);
                self.opened_at.get_or_insert(at);
                self.clicked_at.get_or_insert(at);
            }
            DeliveryStatus::Failed | DeliveryStatus::Bounced => {
                self.error_message = error_message.map(str::to_string);
            }
            _ => {}
        }

        self.status = to;
        self.updated_at = at;
        TransitionOutcome::Applied { from: current, to }
    }
}
