//! Delivery worker pool.
//!
//! One coordinator thread listens for `SendingStarted` on the campaign bus.
//! For each started campaign it fans the `QUEUED` rows out over a scoped
//! thread pool, hands every row to the delivery provider and settles it:
//!
//! ```text
//! QUEUED -> PROCESSING -> send -> WEBPUSH: SENT
//!                               -> EMAIL:   stays PROCESSING (webhooks finish it)
//!                               -> error:   FAILED (provider message kept)
//! ```
//!
//! When the very first send of a campaign cannot even reach the provider,
//! nothing is sent: every row and the campaign become `FAILED`.

use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use eventcrm_campaigns::{CampaignEvent, CampaignStatus, DeliveryLog, DeliveryStatus};
use eventcrm_core::{CampaignId, Channel, OrganizerId};
use eventcrm_events::{EventBus, Subscription};

use crate::collaborators::{DeliveryProviderClient, DeliveryRequest, ProviderError};
use crate::dispatcher::{CampaignDispatcher, CampaignMessage, DispatchError};
use crate::error::StoreError;
use crate::store::CampaignRecord;
use crate::workers::WorkerHandle;

#[derive(Debug, Clone)]
pub struct DeliveryWorkerConfig {
    /// Thread name prefix, also used in logs.
    pub name: String,
    /// Sends in flight per campaign.
    pub workers: usize,
    /// How long the coordinator blocks on the bus before checking for shutdown.
    pub poll_interval: Duration,
}

impl Default for DeliveryWorkerConfig {
    fn default() -> Self {
        Self {
            name: "delivery-worker".to_string(),
            workers: 4,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl DeliveryWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// What one delivery pass over a campaign did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryRun {
    pub attempted: usize,
    pub accepted: usize,
    pub failed: usize,
    /// The provider was unreachable on the first send; the campaign failed.
    pub aborted: bool,
}

impl DeliveryRun {
    fn merge(&mut self, other: DeliveryRun) {
        self.attempted += other.attempted;
        self.accepted += other.accepted;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
pub struct DeliveryWorkerPool;

impl DeliveryWorkerPool {
    /// Subscribe to the dispatcher's bus and start the coordinator thread.
    pub fn spawn<B>(
        config: DeliveryWorkerConfig,
        dispatcher: CampaignDispatcher<B>,
        provider: Arc<dyn DeliveryProviderClient>,
    ) -> io::Result<WorkerHandle>
    where
        B: EventBus<CampaignMessage> + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = dispatcher.bus().subscribe();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || coordinator_loop(config, sub, shutdown_rx, dispatcher, provider))?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn coordinator_loop<B>(
    config: DeliveryWorkerConfig,
    sub: Subscription<CampaignMessage>,
    shutdown_rx: mpsc::Receiver<()>,
    dispatcher: CampaignDispatcher<B>,
    provider: Arc<dyn DeliveryProviderClient>,
) where
    B: EventBus<CampaignMessage>,
{
    info!(worker = %config.name, workers = config.workers, "delivery worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(config.poll_interval) {
            Ok(msg) => {
                let CampaignEvent::SendingStarted(started) = msg.payload() else {
                    continue;
                };
                let result = deliver_campaign(
                    &dispatcher,
                    provider.as_ref(),
                    started.organizer_id,
                    started.campaign_id,
                    config.workers,
                );
                if let Err(err) = result {
                    error!(
                        worker = %config.name,
                        organizer_id = %started.organizer_id,
                        campaign_id = %started.campaign_id,
                        error = %err,
                        "campaign delivery failed"
                    );
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = %config.name, "delivery worker stopped");
}

/// Deliver every `QUEUED` row of a `SENDING` campaign.
///
/// Campaigns in any other status are left alone, so redelivered
/// `SendingStarted` messages are harmless.
pub fn deliver_campaign<B>(
    dispatcher: &CampaignDispatcher<B>,
    provider: &dyn DeliveryProviderClient,
    organizer_id: OrganizerId,
    campaign_id: CampaignId,
    workers: usize,
) -> Result<DeliveryRun, DispatchError>
where
    B: EventBus<CampaignMessage>,
{
    let record = dispatcher
        .store()
        .get(organizer_id, campaign_id)?
        .ok_or(StoreError::NotFound("campaign"))?;
    if record.campaign.status() != CampaignStatus::Sending {
        debug!(
            campaign_id = %campaign_id,
            status = record.campaign.status().as_str(),
            "campaign not sending, skipped"
        );
        return Ok(DeliveryRun::default());
    }

    let queued: Vec<DeliveryLog> = dispatcher
        .store()
        .deliveries(organizer_id, campaign_id)?
        .into_iter()
        .filter(|r| r.status == DeliveryStatus::Queued)
        .collect();
    let Some((first, rest)) = queued.split_first() else {
        return Ok(DeliveryRun::default());
    };

    let sender = RowSender {
        dispatcher,
        provider,
        record: &record,
    };
    let mut run = DeliveryRun::default();

    // The first send doubles as a connectivity check.
    match sender.attempt(first)? {
        Attempt::Accepted => run.merge(DeliveryRun {
            attempted: 1,
            accepted: 1,
            ..Default::default()
        }),
        Attempt::Skipped => {}
        Attempt::Refused(err) if err.is_connection() => {
            dispatcher.fail_dispatch(organizer_id, campaign_id, err.message(), Utc::now())?;
            return Ok(DeliveryRun {
                attempted: 1,
                failed: queued.len(),
                aborted: true,
                ..Default::default()
            });
        }
        Attempt::Refused(err) => {
            sender.fail(first, &err)?;
            run.merge(DeliveryRun { attempted: 1, failed: 1, ..Default::default() });
        }
    }

    if !rest.is_empty() {
        let chunk = rest.len().div_ceil(workers.max(1));
        let sender = &sender;
        let results: Vec<Result<DeliveryRun, DispatchError>> = thread::scope(|scope| {
            let handles: Vec<_> = rest
                .chunks(chunk)
                .map(|rows| scope.spawn(move || sender.send_all(rows)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(DispatchError::WorkerPanicked)))
                .collect()
        });
        for result in results {
            run.merge(result?);
        }
    }

    info!(
        organizer_id = %organizer_id,
        campaign_id = %campaign_id,
        attempted = run.attempted,
        accepted = run.accepted,
        failed = run.failed,
        "campaign handed to provider"
    );
    Ok(run)
}

enum Attempt {
    Accepted,
    /// The row was no longer `QUEUED`.
    Skipped,
    Refused(ProviderError),
}

struct RowSender<'a, B> {
    dispatcher: &'a CampaignDispatcher<B>,
    provider: &'a dyn DeliveryProviderClient,
    record: &'a CampaignRecord,
}

impl<B> RowSender<'_, B>
where
    B: EventBus<CampaignMessage>,
{
    fn send_all(&self, rows: &[DeliveryLog]) -> Result<DeliveryRun, DispatchError> {
        let mut run = DeliveryRun::default();
        for row in rows {
            match self.attempt(row)? {
                Attempt::Accepted => {
                    run.attempted += 1;
                    run.accepted += 1;
                }
                Attempt::Skipped => {}
                Attempt::Refused(err) => {
                    self.fail(row, &err)?;
                    run.attempted += 1;
                    run.failed += 1;
                }
            }
        }
        Ok(run)
    }

    fn attempt(&self, row: &DeliveryLog) -> Result<Attempt, DispatchError> {
        let store = self.dispatcher.store();
        let organizer_id = row.organizer_id;

        let (_, claimed) = store.transition_delivery(
            organizer_id,
            row.id,
            DeliveryStatus::Processing,
            Utc::now(),
            None,
        )?;
        if !claimed.is_applied() {
            return Ok(Attempt::Skipped);
        }

        let request = DeliveryRequest {
            organizer_id,
            campaign_id: row.campaign_id,
            delivery_log_id: row.id,
            customer_id: row.customer_id,
            channel: row.channel,
            address: &row.address,
            template_code: &self.record.template_code,
            fields: self.record.campaign.fields(),
        };
        let dispatch_id = match self.provider.send(&request) {
            Ok(id) => id,
            Err(err) => return Ok(Attempt::Refused(err)),
        };
        store.record_dispatch(organizer_id, row.id, &dispatch_id)?;

        // Email rows wait for provider webhooks; web-push has none.
        if row.channel == Channel::Webpush {
            let now = Utc::now();
            let (sent, _) =
                store.transition_delivery(organizer_id, row.id, DeliveryStatus::Sent, now, None)?;
            self.dispatcher.settle(organizer_id, &sent, now)?;
        }
        Ok(Attempt::Accepted)
    }

    fn fail(&self, row: &DeliveryLog, err: &ProviderError) -> Result<(), DispatchError> {
        warn!(
            organizer_id = %row.organizer_id,
            campaign_id = %row.campaign_id,
            delivery_log_id = %row.id,
            error = %err,
            "recipient send failed"
        );
        let now = Utc::now();
        let (failed, _) = self.dispatcher.store().transition_delivery(
            row.organizer_id,
            row.id,
            DeliveryStatus::Failed,
            now,
            Some(err.message()),
        )?;
        self.dispatcher.settle(row.organizer_id, &failed, now)
    }
}
