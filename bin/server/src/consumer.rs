//! Durable JetStream consumer feeding derived events into the action entry.
//!
//! Every message is acknowledged once handled, whether or not it was
//! addressed to this service and whatever the handling outcome. While a
//! message is being handled its ack deadline is pushed back at half the ack
//! wait, so slow provider calls do not cause a redelivery.

use crate::error::ConsumerError;
use async_nats::jetstream;
use flowhook_flow::{BusEntry, envelope};
use flowhook_pipeline::{ActionEvent, HandlerPipeline};
use futures::StreamExt;
use rootcause::Report;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, instrument, warn};

/// Where and under which name the consumer reads.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Stream holding derived events.
    pub stream_name: String,
    /// Durable consumer name.
    pub consumer_name: String,
    /// Subject filter.
    pub filter_subject: String,
    /// Consumer API this service answers to.
    pub consumer_api: String,
    /// How long the bus waits for an ack before redelivering.
    pub ack_wait: Duration,
}

/// How often a message in progress has its ack deadline extended.
#[must_use]
pub fn progress_interval(ack_wait: Duration) -> Duration {
    (ack_wait / 2).max(Duration::from_millis(500))
}

/// Decodes a message and returns the action event if it is addressed to
/// `consumer_api`.
///
/// # Errors
///
/// Returns an error if the payload is not a bus entry in a readable envelope.
pub fn action_event_for(
    payload: &[u8],
    consumer_api: &str,
) -> Result<Option<ActionEvent>, ConsumerError> {
    let entry: BusEntry = envelope::decode(payload)?;
    if entry.detail.consumer_api != consumer_api {
        return Ok(None);
    }
    Ok(Some(ActionEvent::from(entry.detail)))
}

/// Drives `work` to completion, awaiting `beat` every `every` until it is done.
async fn with_heartbeat<T, B, BF>(
    work: impl Future<Output = T>,
    every: Duration,
    mut beat: B,
) -> T
where
    B: FnMut() -> BF,
    BF: Future<Output = ()>,
{
    let mut work = std::pin::pin!(work);
    let mut ticks = interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            biased;
            out = &mut work => return out,
            _ = ticks.tick() => beat().await,
        }
    }
}

async fn handle_message(
    message: &jetstream::Message,
    consumer_api: &str,
    pipeline: &HandlerPipeline,
) {
    match action_event_for(&message.payload, consumer_api) {
        Ok(Some(event)) => {
            pipeline.handle_action_event(&event).await;
        }
        Ok(None) => debug!(subject = %message.subject, "entry addressed elsewhere"),
        Err(e) => warn!(subject = %message.subject, error = %e, "dropping unreadable entry"),
    }
}

/// Runs the consumer until the message stream ends.
///
/// # Errors
///
/// Returns an error if the stream or consumer cannot be set up, or the
/// message stream cannot be opened.
#[instrument(skip_all, fields(stream = %settings.stream_name, consumer = %settings.consumer_name))]
pub async fn run(
    jetstream: Arc<jetstream::Context>,
    settings: ConsumerSettings,
    pipeline: Arc<HandlerPipeline>,
) -> Result<(), Report<ConsumerError>> {
    let stream = jetstream
        .get_stream(&settings.stream_name)
        .await
        .map_err(|e| ConsumerError::Setup {
            message: format!("failed to get stream: {e}"),
        })?;

    let consumer = stream
        .get_or_create_consumer(
            &settings.consumer_name,
            jetstream::consumer::pull::Config {
                durable_name: Some(settings.consumer_name.clone()),
                filter_subject: settings.filter_subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: settings.ack_wait,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| ConsumerError::Setup {
            message: format!("failed to create consumer: {e}"),
        })?;

    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| ConsumerError::Stream {
            message: format!("failed to get messages: {e}"),
        })?;

    info!("action consumer started");

    let every = progress_interval(settings.ack_wait);
    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "failed to receive message");
                continue;
            }
        };

        let in_progress = &message;
        with_heartbeat(
            handle_message(&message, &settings.consumer_api, &pipeline),
            every,
            || async move {
                if let Err(e) = in_progress.ack_with(jetstream::AckKind::Progress).await {
                    warn!(error = %e, "failed to extend ack deadline");
                }
            },
        )
        .await;

        if let Err(e) = message.ack().await {
            warn!(error = %e, "failed to ack message");
        }
    }

    info!("action consumer stopped");
    Ok(())
}
