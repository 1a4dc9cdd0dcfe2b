use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_core::{Channel, CustomerId, OrganizerId};

/// A customer as seen by one organizer.
///
/// The same person buying from two organizers yields two independent
/// snapshots; consent and contact details never leak between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: CustomerId,
    pub organizer_id: OrganizerId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub marketing_consent: bool,
    pub webpush_consent: bool,
    pub webpush_endpoint: Option<String>,
    /// Date of the first purchase with this organizer. `None` until the
    /// customer has bought something.
    pub first_purchase_at: Option<DateTime<Utc>>,
}

impl CustomerSnapshot {
    pub fn new(id: CustomerId, organizer_id: OrganizerId) -> Self {
        Self {
            id,
            organizer_id,
            name: None,
            email: None,
            phone: None,
            document: None,
            marketing_consent: false,
            webpush_consent: false,
            webpush_endpoint: None,
            first_purchase_at: None,
        }
    }

    pub fn has_purchased(&self) -> bool {
        self.first_purchase_at.is_some()
    }

    pub fn consents_to(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.marketing_consent,
            Channel::Webpush => self.webpush_consent,
        }
    }

    /// Destination on `channel`, if the customer both consented and has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        if !self.consents_to(channel) {
            return None;
        }
        let address = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Webpush => self.webpush_endpoint.as_deref(),
        }?;
        let address = address.trim();
        (!address.is_empty()).then_some(address)
    }

    /// Record a purchase timestamp, keeping the earliest one.
    pub fn note_purchase(&mut self, at: DateTime<Utc>) {
        self.first_purchase_at = Some(match self.first_purchase_at {
            Some(first) => first.min(at),
            None => at,
        });
    }
}
