//! Binding request values to a template's field requirements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use eventcrm_core::{CouponId, DomainError, DomainResult, EventId, OpinionPollId};

use crate::template::{FieldRequirement, Template};

/// Raw values supplied with a campaign request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInput {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub coupon_id: Option<CouponId>,
    #[serde(default)]
    pub opinion_poll_id: Option<OpinionPollId>,
    #[serde(default)]
    pub free_text: BTreeMap<String, String>,
}

/// Fields resolved against a template and frozen onto the campaign.
///
/// Only values the template asks for are kept. `event_id` is also set when
/// it was inferred from a coupon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFields {
    pub event_id: Option<EventId>,
    pub coupon_id: Option<CouponId>,
    pub opinion_poll_id: Option<OpinionPollId>,
    pub free_text: BTreeMap<String, String>,
}

/// Resolve `input` against `template`.
///
/// `coupon_event` looks up the event a coupon belongs to; an unknown coupon
/// is a validation error, as is a coupon for a different event than the one
/// explicitly supplied.
pub fn bind_fields<F>(
    template: &Template,
    input: &FieldInput,
    coupon_event: F,
) -> DomainResult<DynamicFields>
where
    F: Fn(CouponId) -> Option<EventId>,
{
    let mut fields = DynamicFields::default();

    for requirement in &template.editable_fields {
        match requirement {
            FieldRequirement::Event => {
                let id = input
                    .event_id
                    .ok_or_else(|| DomainError::validation("template requires an event"))?;
                fields.event_id = Some(id);
            }
            FieldRequirement::Coupon => {
                let coupon = input
                    .coupon_id
                    .ok_or_else(|| DomainError::validation("template requires a coupon"))?;
                let parent = coupon_event(coupon).ok_or_else(|| {
                    DomainError::validation(format!("coupon {coupon} does not exist"))
                })?;
                if let Some(given) = input.event_id {
                    if given != parent {
                        return Err(DomainError::validation(format!(
                            "coupon {coupon} belongs to event {parent}, not {given}"
                        )));
                    }
                }
                fields.coupon_id = Some(coupon);
                fields.event_id = Some(parent);
            }
            FieldRequirement::OpinionPoll => {
                let poll = input
                    .opinion_poll_id
                    .ok_or_else(|| DomainError::validation("template requires an opinion poll"))?;
                fields.opinion_poll_id = Some(poll);
            }
            FieldRequirement::FreeText(key) => {
                let value = input
                    .free_text
                    .get(key)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        DomainError::validation(format!("template requires text field '{key}'"))
                    })?;
                fields.free_text.insert(key.clone(), value.to_string());
            }
        }
    }

    Ok(fields)
}
