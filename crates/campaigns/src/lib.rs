//! Campaign domain: templates, dynamic field binding, the campaign lifecycle
//! and the per-recipient delivery state machine.
//!
//! No IO here. The orchestrator and delivery worker in `eventcrm-infra`
//! drive these types and persist the results.

pub mod campaign;
pub mod delivery;
pub mod fields;
pub mod template;

pub use campaign::{
    Campaign, CampaignCommand, CampaignCreated, CampaignEvent, CampaignFailed, CampaignSent,
    CampaignStatus, CreateCampaign, FailCampaign, FinishCampaign, RecipientSettled,
    SendingStarted, SettleRecipient, StartSending,
};
pub use delivery::{DeliveryError, DeliveryLog, DeliveryStatus, TransitionOutcome};
pub use fields::{bind_fields, DynamicFields, FieldInput};
pub use template::{FieldRequirement, Template};
