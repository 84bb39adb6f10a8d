use serde::{Deserialize, Serialize};

/// Outcome of one exploration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTuple {
    /// 1-based action ids, best first.
    pub actions: Vec<u32>,
    /// Probability of the top action under the explorer, in `(0, 1]`.
    pub probability: f32,
    /// Whether the decision has to be logged for offline learning.
    pub should_record: bool,
}
