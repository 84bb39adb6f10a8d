//! Wire schema shared with the ingestion backend.
//!
//! Every event is serialized to its own JSON string when it enters the
//! pipeline. A batch carries those strings verbatim, so the posted body is
//! JSON whose `Events` array holds JSON-encoded strings. The backend depends
//! on the exact field names below.

use serde::{Deserialize, Serialize};

/// The action part of an interaction: a bare id for single-action decisions,
/// the ranked list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSet {
    Single(u32),
    Ranked(Vec<u32>),
}

impl From<&[u32]> for ActionSet {
    fn from(actions: &[u32]) -> Self {
        match actions {
            [single] => ActionSet::Single(*single),
            ranked => ActionSet::Ranked(ranked.to_vec()),
        }
    }
}

/// A decision that was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Action")]
    pub action: ActionSet,
    #[serde(rename = "Probability")]
    pub probability: f32,
    /// Serialized caller context.
    #[serde(rename = "Context")]
    pub context: String,
}

/// An outcome reported later for the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "ID")]
    pub id: String,
    /// JSON text of the outcome (a reward is stored as e.g. `"1.5"`).
    #[serde(rename = "Value")]
    pub value: String,
}

impl Observation {
    pub fn reward(id: impl Into<String>, reward: f32) -> serde_json::Result<Self> {
        Ok(Self {
            id: id.into(),
            value: serde_json::to_string(&reward)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Interaction(Interaction),
    Observation(Observation),
}

impl Event {
    pub fn id(&self) -> &str {
        match self {
            Event::Interaction(interaction) => &interaction.id,
            Event::Observation(observation) => &observation.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Interaction(_) => "interaction",
            Event::Observation(_) => "observation",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Interaction> for Event {
    fn from(interaction: Interaction) -> Self {
        Event::Interaction(interaction)
    }
}

impl From<Observation> for Event {
    fn from(observation: Observation) -> Self {
        Event::Observation(observation)
    }
}

/// Unit of upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventBatch {
    /// Serialized events in insertion order.
    pub events: Vec<String>,
    pub experimental_unit_duration_in_seconds: i32,
}

impl EventBatch {
    pub fn new(events: Vec<String>, experimental_unit_duration_in_seconds: i32) -> Self {
        Self {
            events,
            experimental_unit_duration_in_seconds,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Decodes the inner event strings.
    pub fn parse_events(&self) -> serde_json::Result<Vec<Event>> {
        self.events
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn interaction() -> Interaction {
        Interaction {
            id: "user42".into(),
            action: ActionSet::Single(2),
            probability: 1.0 / 3.0,
            context: r#"{"age":31,"tags":["a","b"]}"#.into(),
        }
    }

    #[test]
    fn interaction_uses_backend_field_names() {
        let json = Event::from(interaction()).to_json().unwrap();
        assert!(json.starts_with(r#"{"ID":"user42","Action":2,"Probability":"#));
        assert!(json.ends_with(r#","Context":"{\"age\":31,\"tags\":[\"a\",\"b\"]}"}"#));
    }

    #[test]
    fn reward_observation_stores_json_text() {
        let observation = Observation::reward("user42", 1.5).unwrap();
        assert_eq!(observation.value, "1.5");
        assert_eq!(
            Event::from(observation).to_json().unwrap(),
            r#"{"ID":"user42","Value":"1.5"}"#
        );
    }

    #[test]
    fn batch_body_is_double_encoded() {
        let events = vec![
            Event::from(interaction()).to_json().unwrap(),
            Event::from(Observation::reward("user42", 0.0).unwrap())
                .to_json()
                .unwrap(),
        ];
        let batch = EventBatch::new(events.clone(), 3600);
        let body: Value = serde_json::from_str(&batch.to_json().unwrap()).unwrap();

        assert_eq!(body["ExperimentalUnitDurationInSeconds"], json!(3600));
        let wire_events = body["Events"].as_array().unwrap();
        assert_eq!(wire_events.len(), 2);
        assert_eq!(wire_events[0], Value::String(events[0].clone()));
        assert_eq!(wire_events[1], Value::String(events[1].clone()));
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[test]
    fn batch_round_trip_restores_fields() {
        let ranked = Interaction {
            id: "k-2".into(),
            action: ActionSet::from(&[3u32, 1, 2][..]),
            probability: 0.25,
            context: "plain text context".into(),
        };
        let observation = Observation {
            id: "k-2".into(),
            value: r#"{"clicked":true}"#.into(),
        };
        let batch = EventBatch::new(
            vec![
                Event::from(interaction()).to_json().unwrap(),
                Event::from(ranked.clone()).to_json().unwrap(),
                Event::from(observation.clone()).to_json().unwrap(),
            ],
            0,
        );

        let parsed = EventBatch::from_json(&batch.to_json().unwrap()).unwrap();
        assert_eq!(parsed, batch);

        let events = parsed.parse_events().unwrap();
        match &events[0] {
            Event::Interaction(first) => {
                assert_eq!(first.id, "user42");
                assert_eq!(first.action, ActionSet::Single(2));
                assert!((first.probability - 1.0 / 3.0).abs() < 1e-6);
                assert_eq!(first.context, interaction().context);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events[1], Event::Interaction(ranked));
        assert_eq!(events[2], Event::Observation(observation));
        assert_eq!(events[2].kind(), "observation");
    }

    #[test]
    fn action_set_from_slice() {
        assert_eq!(ActionSet::from(&[4u32][..]), ActionSet::Single(4));
        assert_eq!(
            ActionSet::from(&[1u32, 2][..]),
            ActionSet::Ranked(vec![1, 2])
        );
    }
}
