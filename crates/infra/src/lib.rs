//! Infrastructure layer: stores, collaborators, quota backends, services and workers.

pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod orchestrator;
pub mod quota;
pub mod reconciler;
pub mod reporting;
pub mod store;
pub mod sync;
pub mod tagging;
pub mod webhooks;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, EngineConfig};
pub use dispatcher::{CampaignDispatcher, CampaignMessage, DispatchError};
pub use engine::{CampaignBus, Collaborators, Engine};
pub use error::{OrchestratorError, QuotaError, QuotaStoreError, ServiceError, StoreError};
pub use orchestrator::{CampaignOrchestrator, CampaignRequest, CampaignStatusView};
pub use webhooks::{DeliveryWebhook, WebhookError, WebhookReceipt};
