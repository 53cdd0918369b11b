use crate::enrich::ContextEnricher;
use crate::record::LogRecord;
use crate::sink::{Envelope, LogSink};
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::warn;

const MAX_SEND_ATTEMPTS: u32 = 5;

/// Write path in front of a [`LogSink`].
///
/// Each record is enriched inline on the caller's thread, then handed to a
/// background task through a bounded channel. The task batches envelopes
/// and drives the sink, so network I/O never blocks the logging call.
pub struct PersonHandler {
    enricher: Arc<ContextEnricher>,
    sender: mpsc::Sender<Envelope>,
    /// Records passed to [`PersonHandler::write`].
    pub total_events: Arc<AtomicU64>,
    /// Records picked up by the background task.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full or the worker stopped.
    pub dropped_events: Arc<AtomicU64>,
}

impl PersonHandler {
    /// Create a handler and spawn the background task that pulls
    /// [`Envelope`]s from the channel and sends them to `sink`.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval`. The returned handle completes once every clone of
    /// the sender is gone and the last batch has been flushed.
    pub fn new(
        sink: Arc<dyn LogSink>,
        enricher: Arc<ContextEnricher>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Envelope>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let enqueued_events_bg = Arc::clone(&enqueued_events);

        let handle = tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);
            // Ticks on a fixed schedule so a steady trickle of records
            // cannot keep postponing the flush of a partial batch.
            let mut flush_ticker = interval(flush_interval);
            flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(envelope) => {
                            batch.push(envelope);
                            enqueued_events_bg.fetch_add(1, Ordering::Relaxed);
                            if batch.len() >= batch_size {
                                if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                    warn!(error = %e, "dropping log batch after repeated send failures");
                                }
                            }
                        }
                        None => {
                            if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                warn!(error = %e, "dropping final log batch");
                            }
                            if let Err(e) = sink.flush().await {
                                warn!(error = %e, "log sink flush failed on shutdown");
                            }
                            break;
                        }
                    },
                    _ = flush_ticker.tick() => {
                        if !batch.is_empty() {
                            if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                warn!(error = %e, "dropping log batch after repeated flush failures");
                            }
                        }
                    }
                }
            }
        });

        (Self {
            enricher,
            sender: tx,
            total_events,
            enqueued_events,
            dropped_events,
        }, handle)
    }

    /// The enricher used on the write path, e.g. to attach a session.
    pub fn enricher(&self) -> &Arc<ContextEnricher> {
        &self.enricher
    }

    /// Enrich `record` and queue it for the sink.
    ///
    /// The forwarded record is identical to the input except that `person`
    /// has been taken out of its context; the computed person travels next
    /// to it in the [`Envelope`].
    pub fn write(&self, mut record: LogRecord) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let context = std::mem::take(&mut record.context);
        let (context, person) = self.enricher.enrich(context);
        let envelope = Envelope {
            record: record.with_context(context),
            person,
        };

        if let Err(e) = self.sender.try_send(envelope) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => warn!("log channel full, dropping log record"),
                mpsc::error::TrySendError::Closed(_) => warn!("log worker stopped, dropping log record"),
            }
        }
    }
}

/// Send every envelope in `batch`, retrying from the first unsent one with
/// exponential backoff. The batch is cleared either way.
async fn send_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<Envelope>,
    mut backoff: Duration,
    max_backoff: Duration,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut sent = 0;
    let mut attempts = 0;

    while sent < batch.len() {
        match sink.send(&batch[sent]).await {
            Ok(()) => sent += 1,
            Err(e) => {
                attempts += 1;
                if attempts >= MAX_SEND_ATTEMPTS {
                    batch.clear();
                    return Err(e);
                }
                warn!(error = %e, ?backoff, "log sink send failed, retrying");
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }
    }

    batch.clear();
    Ok(())
}
