use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::explorer::Recorder;

/// One decision captured by [`StringRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDecision {
    pub unique_key: String,
    pub actions: Vec<u32>,
    pub probability: f32,
    /// JSON form of the context.
    pub context: String,
}

/// Keeps recorded decisions in memory.
///
/// Meant for offline replay and tests; production code records through the
/// decision-service pipeline instead.
pub struct StringRecorder<C> {
    entries: Mutex<Vec<RecordedDecision>>,
    _context: PhantomData<fn(&C)>,
}

impl<C> Default for StringRecorder<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            _context: PhantomData,
        }
    }
}

impl<C> StringRecorder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<RecordedDecision> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// All decisions, one line each: `actions probability key | context`.
    pub fn recording(&self) -> String {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out = String::new();
        for entry in entries.iter() {
            let actions = entry
                .actions
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(
                out,
                "{actions} {:.5} {} | {}",
                entry.probability, entry.unique_key, entry.context
            );
        }
        out
    }
}

impl<C: Serialize> Recorder<C> for StringRecorder<C> {
    fn record(&self, context: &C, actions: &[u32], probability: f32, unique_key: &str) -> bool {
        let context = match serde_json::to_string(context) {
            Ok(json) => json,
            Err(err) => {
                warn!(unique_key, error = %err, "failed to serialize decision context");
                return false;
            }
        };
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedDecision {
                unique_key: unique_key.to_string(),
                actions: actions.to_vec(),
                probability,
                context,
            });
        true
    }
}
