//! Windowing stage.
//!
//! Events are collected into wall-clock windows of `max_duration`. Inside a
//! window a chunk closes as soon as it holds `max_event_count` events or
//! `max_buffer_size_bytes` of serialized payload; whatever is left when the
//! window ends closes with it. Each closed chunk becomes one batch.
//!
//! A chunk never exceeds the byte budget, except for a single event that is
//! larger than the budget on its own. Such an event travels alone.

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::config::BatchingConfiguration;

/// Accumulator for the chunk currently being filled.
#[derive(Debug)]
pub struct EventWindow {
    max_event_count: usize,
    max_bytes: usize,
    items: Vec<String>,
    bytes: usize,
}

impl EventWindow {
    pub fn new(config: &BatchingConfiguration) -> Self {
        Self {
            max_event_count: config.max_event_count.max(1),
            max_bytes: config.max_buffer_size_bytes.max(1),
            items: Vec::new(),
            bytes: 0,
        }
    }

    /// Appends an event and returns the chunks it closed, oldest first.
    ///
    /// An event that does not fit the remaining byte budget first closes the
    /// current chunk and then opens the next one.
    pub fn push(&mut self, event: String) -> Vec<Vec<String>> {
        let mut closed = Vec::new();
        if !self.items.is_empty() && self.bytes + event.len() > self.max_bytes {
            closed.extend(self.take());
        }

        self.bytes += event.len();
        self.items.push(event);
        if self.items.len() >= self.max_event_count || self.bytes >= self.max_bytes {
            closed.extend(self.take());
        }
        closed
    }

    /// Closes the current chunk, if it holds anything.
    pub fn take(&mut self) -> Option<Vec<String>> {
        if self.items.is_empty() {
            return None;
        }
        self.bytes = 0;
        Some(std::mem::take(&mut self.items))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Drives the window until `events` closes, then emits the remainder and
/// returns, which closes `batches`.
///
/// Sending into `batches` waits for room, so a slow upload stage stops this
/// loop from draining `events`.
pub(crate) async fn run_windowing(
    mut events: mpsc::Receiver<String>,
    batches: mpsc::Sender<Vec<String>>,
    config: BatchingConfiguration,
) {
    let period = config.max_duration();
    let mut window = EventWindow::new(&config);
    let mut deadline = Instant::now() + period;

    loop {
        tokio::select! {
            received = events.recv() => {
                let Some(event) = received else { break };
                for chunk in window.push(event) {
                    trace!(events = chunk.len(), "chunk closed by count or size");
                    if batches.send(chunk).await.is_err() {
                        debug!("upload stage closed; stopping windowing");
                        return;
                    }
                }
            }
            () = sleep_until(deadline) => {
                if let Some(chunk) = window.take() {
                    trace!(events = chunk.len(), "chunk closed by window");
                    if batches.send(chunk).await.is_err() {
                        debug!("upload stage closed; stopping windowing");
                        return;
                    }
                }
                deadline = Instant::now() + period;
            }
        }
    }

    if let Some(chunk) = window.take() {
        let _ = batches.send(chunk).await;
    }
    debug!("windowing drained");
}
