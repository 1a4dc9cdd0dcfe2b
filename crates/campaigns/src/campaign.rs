use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_core::{
    Aggregate, AggregateRoot, CampaignId, Channel, CustomerId, DeliveryLogId, DomainError,
    OrganizerId, TemplateId,
};
use eventcrm_events::Event;

use crate::delivery::DeliveryStatus;
use crate::fields::DynamicFields;

/// Campaign lifecycle. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Pending => "PENDING",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Sent => "SENT",
            CampaignStatus::Failed => "FAILED",
        }
    }
}

/// Aggregate root: Campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    id: CampaignId,
    organizer_id: Option<OrganizerId>,
    channel: Channel,
    template_id: Option<TemplateId>,
    name: Option<String>,
    fields: DynamicFields,
    total_recipients: u32,
    sent_count: u32,
    status: CampaignStatus,
    failure_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Campaign {
    /// Not-yet-created instance; `CreateCampaign` brings it to life.
    pub fn empty(id: CampaignId) -> Self {
        Self {
            id,
            organizer_id: None,
            channel: Channel::Email,
            template_id: None,
            name: None,
            fields: DynamicFields::default(),
            total_recipients: 0,
            sent_count: 0,
            status: CampaignStatus::Pending,
            failure_reason: None,
            created_at: None,
            finished_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CampaignId {
        self.id
    }

    pub fn organizer_id(&self) -> Option<OrganizerId> {
        self.organizer_id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn template_id(&self) -> Option<TemplateId> {
        self.template_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fields(&self) -> &DynamicFields {
        &self.fields
    }

    pub fn total_recipients(&self) -> u32 {
        self.total_recipients
    }

    pub fn sent_count(&self) -> u32 {
        self.sent_count
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Campaign {
    type Id = CampaignId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub channel: Channel,
    pub template_id: TemplateId,
    pub name: Option<String>,
    pub fields: DynamicFields,
    pub total_recipients: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSending {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub occurred_at: DateTime<Utc>,
}

/// A recipient's row changed; `sent_count` is the recount over all rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRecipient {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub delivery_log_id: DeliveryLogId,
    pub customer_id: CustomerId,
    pub status: DeliveryStatus,
    pub sent_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishCampaign {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub sent_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCampaign {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignCommand {
    Create(CreateCampaign),
    StartSending(StartSending),
    SettleRecipient(SettleRecipient),
    Finish(FinishCampaign),
    Fail(FailCampaign),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCreated {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub channel: Channel,
    pub template_id: TemplateId,
    pub name: Option<String>,
    pub fields: DynamicFields,
    pub total_recipients: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingStarted {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub channel: Channel,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSettled {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub delivery_log_id: DeliveryLogId,
    pub customer_id: CustomerId,
    pub status: DeliveryStatus,
    pub sent_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSent {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub sent_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignFailed {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignEvent {
    Created(CampaignCreated),
    SendingStarted(SendingStarted),
    RecipientSettled(RecipientSettled),
    Sent(CampaignSent),
    Failed(CampaignFailed),
}

impl CampaignEvent {
    pub fn campaign_id(&self) -> CampaignId {
        match self {
            CampaignEvent::Created(e) => e.campaign_id,
            CampaignEvent::SendingStarted(e) => e.campaign_id,
            CampaignEvent::RecipientSettled(e) => e.campaign_id,
            CampaignEvent::Sent(e) => e.campaign_id,
            CampaignEvent::Failed(e) => e.campaign_id,
        }
    }
}

impl Event for CampaignEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CampaignEvent::Created(_) => "campaigns.campaign.created",
            CampaignEvent::SendingStarted(_) => "campaigns.campaign.sending_started",
            CampaignEvent::RecipientSettled(_) => "campaigns.campaign.recipient_settled",
            CampaignEvent::Sent(_) => "campaigns.campaign.sent",
            CampaignEvent::Failed(_) => "campaigns.campaign.failed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CampaignEvent::Created(e) => e.occurred_at,
            CampaignEvent::SendingStarted(e) => e.occurred_at,
            CampaignEvent::RecipientSettled(e) => e.occurred_at,
            CampaignEvent::Sent(e) => e.occurred_at,
            CampaignEvent::Failed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Campaign {
    type Command = CampaignCommand;
    type Event = CampaignEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CampaignEvent::Created(e) => {
                self.id = e.campaign_id;
                self.organizer_id = Some(e.organizer_id);
                self.channel = e.channel;
                self.template_id = Some(e.template_id);
                self.name = e.name.clone();
                self.fields = e.fields.clone();
                self.total_recipients = e.total_recipients;
                self.sent_count = 0;
                self.status = CampaignStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            CampaignEvent::SendingStarted(_) => {
                self.status = CampaignStatus::Sending;
            }
            CampaignEvent::RecipientSettled(e) => {
                self.sent_count = e.sent_count;
            }
            CampaignEvent::Sent(e) => {
                self.sent_count = e.sent_count;
                self.status = CampaignStatus::Sent;
                self.finished_at = Some(e.occurred_at);
            }
            CampaignEvent::Failed(e) => {
                self.status = CampaignStatus::Failed;
                self.failure_reason = Some(e.reason.clone());
                self.finished_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CampaignCommand::Create(cmd) => self.handle_create(cmd),
            CampaignCommand::StartSending(cmd) => self.handle_start(cmd),
            CampaignCommand::SettleRecipient(cmd) => self.handle_settle(cmd),
            CampaignCommand::Finish(cmd) => self.handle_finish(cmd),
            CampaignCommand::Fail(cmd) => self.handle_fail(cmd),
        }
    }
}

impl Campaign {
    fn ensure_target(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.organizer_id != Some(organizer_id) {
            return Err(DomainError::invariant("organizer mismatch"));
        }
        if self.id != campaign_id {
            return Err(DomainError::invariant("campaign_id mismatch"));
        }
        Ok(())
    }

    fn ensure_sent_count(&self, sent_count: u32) -> Result<(), DomainError> {
        if sent_count > self.total_recipients {
            return Err(DomainError::invariant(format!(
                "sent_count {sent_count} exceeds total_recipients {}",
                self.total_recipients
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCampaign) -> Result<Vec<CampaignEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("campaign already exists"));
        }
        if cmd.total_recipients == 0 {
            return Err(DomainError::validation("campaign has no recipients"));
        }

        Ok(vec![CampaignEvent::Created(CampaignCreated {
            organizer_id: cmd.organizer_id,
            campaign_id: cmd.campaign_id,
            channel: cmd.channel,
            template_id: cmd.template_id,
            name: cmd.name.clone(),
            fields: cmd.fields.clone(),
            total_recipients: cmd.total_recipients,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartSending) -> Result<Vec<CampaignEvent>, DomainError> {
        self.ensure_target(cmd.organizer_id, cmd.campaign_id)?;
        if self.status != CampaignStatus::Pending {
            return Err(DomainError::invariant(format!(
                "cannot start sending a {} campaign",
                self.status.as_str()
            )));
        }

        Ok(vec![CampaignEvent::SendingStarted(SendingStarted {
            organizer_id: cmd.organizer_id,
            campaign_id: cmd.campaign_id,
            channel: self.channel,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle(&self, cmd: &SettleRecipient) -> Result<Vec<CampaignEvent>, DomainError> {
        self.ensure_target(cmd.organizer_id, cmd.campaign_id)?;
        if self.status != CampaignStatus::Sending {
            return Err(DomainError::invariant(format!(
                "cannot settle recipients of a {} campaign",
                self.status.as_str()
            )));
        }
        self.ensure_sent_count(cmd.sent_count)?;

        Ok(vec![CampaignEvent::RecipientSettled(RecipientSettled {
            organizer_id: cmd.organizer_id,
            campaign_id: cmd.campaign_id,
            delivery_log_id: cmd.delivery_log_id,
            customer_id: cmd.customer_id,
            status: cmd.status,
            // Recounts can race; never let the counter go backwards.
            sent_count: cmd.sent_count.max(self.sent_count),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finish(&self, cmd: &FinishCampaign) -> Result<Vec<CampaignEvent>, DomainError> {
        self.ensure_target(cmd.organizer_id, cmd.campaign_id)?;
        if self.status != CampaignStatus::Sending {
            return Err(DomainError::invariant(format!(
                "cannot finish a {} campaign",
                self.status.as_str()
            )));
        }
        self.ensure_sent_count(cmd.sent_count)?;

        Ok(vec![CampaignEvent::Sent(CampaignSent {
            organizer_id: cmd.organizer_id,
            campaign_id: cmd.campaign_id,
            sent_count: cmd.sent_count.max(self.sent_count),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail(&self, cmd: &FailCampaign) -> Result<Vec<CampaignEvent>, DomainError> {
        self.ensure_target(cmd.organizer_id, cmd.campaign_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot fail a {} campaign",
                self.status.as_str()
            )));
        }

        Ok(vec![CampaignEvent::Failed(CampaignFailed {
            organizer_id: cmd.organizer_id,
            campaign_id: cmd.campaign_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
