//! Test sinks shared by the pipeline tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use decision_service::{BatchSink, BatchingConfiguration, DeliveryError, Event, EventBatch};
use tokio::sync::Semaphore;

/// Keeps every batch it receives.
#[derive(Default)]
pub struct CountingSink {
    batches: Mutex<Vec<EventBatch>>,
}

impl CountingSink {
    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn event_count(&self) -> usize {
        self.batches().iter().map(EventBatch::len).sum()
    }

    pub fn events(&self) -> Vec<Event> {
        self.batches()
            .iter()
            .flat_map(|batch| batch.parse_events().expect("valid events"))
            .collect()
    }
}

#[async_trait]
impl BatchSink for CountingSink {
    async fn upload(&self, batch: &EventBatch) -> Result<(), DeliveryError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Blocks every upload until the test opens the gate.
pub struct GatedSink {
    gate: Semaphore,
    pub inner: CountingSink,
}

impl GatedSink {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            inner: CountingSink::default(),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl BatchSink for GatedSink {
    async fn upload(&self, batch: &EventBatch) -> Result<(), DeliveryError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| DeliveryError::Task(err.to_string()))?;
        self.inner.upload(batch).await
    }
}

/// Fails every odd-numbered upload.
#[derive(Default)]
pub struct FlakySink {
    calls: Mutex<usize>,
    pub delivered: CountingSink,
}

#[async_trait]
impl BatchSink for FlakySink {
    async fn upload(&self, batch: &EventBatch) -> Result<(), DeliveryError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call % 2 == 1 {
            return Err(DeliveryError::Task(format!("simulated outage on call {call}")));
        }
        self.delivered.upload(batch).await
    }
}

pub fn batching(count: usize, capacity: usize) -> BatchingConfiguration {
    BatchingConfiguration {
        max_buffer_size_bytes: 1 << 20,
        max_duration_ms: 60_000,
        max_event_count: count,
        max_upload_queue_capacity: capacity,
    }
}
