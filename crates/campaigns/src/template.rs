use serde::{Deserialize, Serialize};

use eventcrm_core::{Channel, DomainError, DomainResult, PlanTier, TemplateId};

/// A dynamic field a template needs filled in before it can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum FieldRequirement {
    /// Needs a ticketed event.
    Event,
    /// Needs a coupon; the coupon's event is attached for attribution.
    Coupon,
    OpinionPoll,
    /// Needs a non-empty text value under `key`.
    FreeText(String),
}

/// Read-only catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub channel: Channel,
    pub code: String,
    pub editable_fields: Vec<FieldRequirement>,
    /// Minimum plan an organizer needs to use this template.
    pub tier: PlanTier,
}

impl Template {
    pub fn requires(&self, field: &FieldRequirement) -> bool {
        self.editable_fields.contains(field)
    }

    /// Whether the template carries an event reference (directly or via a coupon).
    pub fn references_event(&self) -> bool {
        self.requires(&FieldRequirement::Event) || self.requires(&FieldRequirement::Coupon)
    }

    /// Channel and plan checks done before any recipient is resolved.
    pub fn ensure_usable(&self, channel: Channel, plan: PlanTier) -> DomainResult<()> {
        if self.channel != channel {
            return Err(DomainError::validation(format!(
                "template {} is for {}, not {}",
                self.code, self.channel, channel
            )));
        }
        if !plan.satisfies(self.tier) {
            return Err(DomainError::validation(format!(
                "template {} requires the {:?} plan",
                self.code, self.tier
            )));
        }
        Ok(())
    }
}
