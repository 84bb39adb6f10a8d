//! The event pipeline behind the decision service.
//!
//! ```text
//! try_record / record ──► ingestion queue ──► windowing ──► upload queue ──► upload workers ──► sink
//!                        (bounded, cap N)                  (bounded, cap N)  (one per CPU)
//! ```
//!
//! Each arrow is a bounded channel. A stalled sink fills the upload queue,
//! which stalls windowing, which lets the ingestion queue fill; from then on
//! non-blocking submissions fail instead of buffering without bound.

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use mwt_explore::Recorder;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::batching::run_windowing;
use crate::config::{BatchingConfiguration, ContextSerializer};
use crate::error::{Result, ServiceError};
use crate::event::{ActionSet, Event, EventBatch, Interaction, Observation};
use crate::metrics::PipelineMetrics;
use crate::upload::BatchSink;

pub struct DecisionServiceRecorder<C> {
    sender: RwLock<Option<mpsc::Sender<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    context_serializer: ContextSerializer<C>,
    metrics: PipelineMetrics,
}

impl<C> DecisionServiceRecorder<C> {
    /// Starts the windowing and upload stages on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails for invalid batching limits or when called outside a runtime.
    pub fn spawn(
        batch_config: BatchingConfiguration,
        experimental_unit_duration_in_seconds: i32,
        context_serializer: ContextSerializer<C>,
        sink: Arc<dyn BatchSink>,
    ) -> Result<Self> {
        batch_config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ServiceError::Config("the recorder must be started inside a tokio runtime".into())
        })?;

        let capacity = batch_config.max_upload_queue_capacity;
        let parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let metrics = PipelineMetrics::default();

        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (batch_tx, batch_rx) = mpsc::channel(capacity);

        let windowing = runtime.spawn(run_windowing(event_rx, batch_tx, batch_config));
        let uploads = runtime.spawn(run_uploads(
            batch_rx,
            sink,
            experimental_unit_duration_in_seconds,
            parallelism,
            metrics.clone(),
        ));
        info!(capacity, parallelism, "decision event pipeline started");

        Ok(Self {
            sender: RwLock::new(Some(event_tx)),
            tasks: Mutex::new(vec![windowing, uploads]),
            context_serializer,
            metrics,
        })
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// True once [`flush`](Self::flush) has started.
    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Queues a decision without waiting. Returns `false` if it was dropped.
    pub fn try_record(
        &self,
        context: &C,
        actions: &[u32],
        probability: f32,
        unique_key: &str,
    ) -> bool {
        let event = self.interaction(context, actions, probability, unique_key);
        self.try_enqueue(event)
    }

    /// Queues a decision, waiting for room. Returns `false` only after flush.
    pub async fn record(
        &self,
        context: &C,
        actions: &[u32],
        probability: f32,
        unique_key: &str,
    ) -> bool {
        let event = self.interaction(context, actions, probability, unique_key);
        self.enqueue(event).await
    }

    pub fn try_report_reward(&self, reward: f32, unique_key: &str) -> bool {
        match Observation::reward(unique_key, reward) {
            Ok(observation) => self.try_enqueue(observation.into()),
            Err(err) => self.reject_unserializable(unique_key, &err),
        }
    }

    pub async fn report_reward(&self, reward: f32, unique_key: &str) -> bool {
        match Observation::reward(unique_key, reward) {
            Ok(observation) => self.enqueue(observation.into()).await,
            Err(err) => self.reject_unserializable(unique_key, &err),
        }
    }

    /// Queues an arbitrary outcome given as JSON text.
    pub fn try_report_outcome(&self, outcome_json: &str, unique_key: &str) -> bool {
        self.try_enqueue(outcome(outcome_json, unique_key))
    }

    pub async fn report_outcome(&self, outcome_json: &str, unique_key: &str) -> bool {
        self.enqueue(outcome(outcome_json, unique_key)).await
    }

    /// Stops accepting events and waits until every accepted event went
    /// through exactly one upload attempt.
    ///
    /// Later calls return immediately. Submitting events while a flush is in
    /// progress is not supported; such events are rejected or may miss the
    /// drain.
    pub async fn flush(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if sender.is_none() {
            debug!("flush called on a closed recorder");
        }
        drop(sender);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "pipeline task ended abnormally");
            }
        }
        info!(metrics = ?self.metrics.snapshot(), "decision event pipeline flushed");
    }

    fn interaction(
        &self,
        context: &C,
        actions: &[u32],
        probability: f32,
        unique_key: &str,
    ) -> Event {
        Interaction {
            id: unique_key.to_string(),
            action: ActionSet::from(actions),
            probability,
            context: (self.context_serializer)(context),
        }
        .into()
    }

    fn encode(&self, event: &Event) -> Option<String> {
        if event.id().is_empty() {
            warn!(kind = event.kind(), "rejecting event without id");
            self.metrics.events_dropped.inc();
            return None;
        }
        match event.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                self.reject_unserializable(event.id(), &err);
                None
            }
        }
    }

    fn reject_unserializable(&self, unique_key: &str, err: &serde_json::Error) -> bool {
        warn!(unique_key, error = %err, "failed to serialize event");
        self.metrics.events_dropped.inc();
        false
    }

    fn current_sender(&self) -> Option<mpsc::Sender<String>> {
        self.sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn try_enqueue(&self, event: Event) -> bool {
        let Some(json) = self.encode(&event) else {
            return false;
        };
        let guard = self
            .sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = guard.as_ref() else {
            warn!(unique_key = event.id(), "recorder already flushed; dropping event");
            self.metrics.events_dropped.inc();
            return false;
        };

        match sender.try_send(json) {
            Ok(()) => {
                self.metrics.events_accepted.inc();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    unique_key = event.id(),
                    kind = event.kind(),
                    "ingestion queue full; dropping event"
                );
                self.metrics.events_dropped.inc();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(unique_key = event.id(), "pipeline stopped; dropping event");
                self.metrics.events_dropped.inc();
                false
            }
        }
    }

    async fn enqueue(&self, event: Event) -> bool {
        let Some(json) = self.encode(&event) else {
            return false;
        };
        let Some(sender) = self.current_sender() else {
            warn!(unique_key = event.id(), "recorder already flushed; dropping event");
            self.metrics.events_dropped.inc();
            return false;
        };

        if sender.send(json).await.is_err() {
            error!(unique_key = event.id(), "pipeline stopped; dropping event");
            self.metrics.events_dropped.inc();
            return false;
        }
        self.metrics.events_accepted.inc();
        true
    }
}

impl<C> Recorder<C> for DecisionServiceRecorder<C> {
    fn record(&self, context: &C, actions: &[u32], probability: f32, unique_key: &str) -> bool {
        self.try_record(context, actions, probability, unique_key)
    }
}

fn outcome(outcome_json: &str, unique_key: &str) -> Event {
    Observation {
        id: unique_key.to_string(),
        value: outcome_json.to_string(),
    }
    .into()
}

/// Upload stage: at most `parallelism` uploads in flight. The dispatcher
/// waits for a free worker before taking the next batch, so the upload queue
/// is the pool's input queue.
async fn run_uploads(
    mut batches: mpsc::Receiver<Vec<String>>,
    sink: Arc<dyn BatchSink>,
    experimental_unit_duration_in_seconds: i32,
    parallelism: usize,
    metrics: PipelineMetrics,
) {
    let workers = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut in_flight = JoinSet::new();

    while let Some(events) = batches.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let sink = Arc::clone(&sink);
        let metrics = metrics.clone();
        let batch = EventBatch::new(events, experimental_unit_duration_in_seconds);
        in_flight.spawn(async move {
            upload_batch(sink.as_ref(), &batch, &metrics).await;
            drop(permit);
        });

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(err) = finished {
                error!(error = %err, "upload worker panicked");
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(err) = finished {
            error!(error = %err, "upload worker panicked");
        }
    }
    debug!("upload stage drained");
}

async fn upload_batch(sink: &dyn BatchSink, batch: &EventBatch, metrics: &PipelineMetrics) {
    let events = batch.len() as u64;
    match sink.upload(batch).await {
        Ok(()) => {
            metrics.batches_uploaded.inc();
            metrics.events_uploaded.inc_by(events);
            debug!(events, "batch uploaded");
        }
        Err(err) => {
            metrics.batches_failed.inc();
            error!(events, error = %err, "batch upload failed; batch dropped");
        }
    }
}
