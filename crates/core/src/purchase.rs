//! Purchase history records, as supplied by the purchase history provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{CategoryId, EventId};

/// One ticket purchase by a customer from an organizer.
///
/// Refunds are represented by the provider either dropping the record or
/// returning a negative `amount_cents` / `ticket_count` adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub event_id: EventId,
    pub category_id: CategoryId,
    /// Amount in cents (smallest currency unit).
    pub amount_cents: i64,
    pub ticket_count: i64,
    pub purchased_at: DateTime<Utc>,
}

impl Purchase {
    /// `false` for refund adjustments, which carry nothing positive.
    pub fn is_sale(&self) -> bool {
        self.amount_cents > 0 || self.ticket_count > 0
    }
}

/// Lifetime aggregates over a purchase history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifetimeTotals {
    pub spent_cents: i64,
    pub tickets: i64,
    pub purchases: usize,
    pub last_purchase_at: Option<DateTime<Utc>>,
    pub first_purchase_at: Option<DateTime<Utc>>,
}

impl LifetimeTotals {
    pub fn of(history: &[Purchase]) -> Self {
        history.iter().fold(Self::default(), |mut acc, p| {
            acc.spent_cents += p.amount_cents;
            acc.tickets += p.ticket_count;
            acc.purchases += 1;
            acc.last_purchase_at = acc.last_purchase_at.max(Some(p.purchased_at));
            acc.first_purchase_at = Some(match acc.first_purchase_at {
                Some(first) => first.min(p.purchased_at),
                None => p.purchased_at,
            });
            acc
        })
    }
}
