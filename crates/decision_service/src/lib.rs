//! Decision service client.
//!
//! Wraps the deterministic explorer from `mwt-explore` and ships recorded
//! decisions plus later-reported outcomes to the ingestion backend through a
//! bounded, batching pipeline. Telemetry problems never fail a decision:
//! submissions report a boolean and failed uploads are logged and counted.

mod batching;
mod config;
mod error;
mod event;
mod metrics;
mod recorder;
mod service;
mod upload;

pub use batching::EventWindow;
pub use config::{
    load_settings, BatchingConfiguration, ContextSerializer, DecisionServiceConfiguration,
    ServiceSettings, ENV_AUTHORIZATION_TOKEN, ENV_SERVICE_ADDRESS, POST_EXPERIMENTAL_UNITS_PATH,
};
pub use error::{DeliveryError, Result, ServiceError};
pub use event::{ActionSet, Event, EventBatch, Interaction, Observation};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use recorder::DecisionServiceRecorder;
pub use service::DecisionService;
pub use upload::{BatchSink, FileBatchSink, HttpBatchSink};

pub use mwt_explore;
