use std::sync::Arc;

use mwt_explore::{ExploreError, Explorer, MwtExplorer};
use tracing::info;

use crate::config::{DecisionServiceConfiguration, ServiceSettings};
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::recorder::DecisionServiceRecorder;
use crate::upload::{BatchSink, HttpBatchSink};

/// Client-side decision service: chooses actions and ships the resulting
/// interactions and outcomes to the backend.
pub struct DecisionService<C> {
    settings: ServiceSettings,
    explorer: Arc<dyn Explorer<C>>,
    mwt: MwtExplorer<C>,
    recorder: Arc<DecisionServiceRecorder<C>>,
}

impl<C: 'static> DecisionService<C> {
    /// Starts a service that posts batches over HTTP.
    pub fn new(config: DecisionServiceConfiguration<C>) -> Result<Self> {
        let sink = Arc::new(HttpBatchSink::new(config.settings())?);
        Self::with_sink(config, sink)
    }

    /// Starts a service that hands batches to `sink`.
    pub fn with_sink(
        config: DecisionServiceConfiguration<C>,
        sink: Arc<dyn BatchSink>,
    ) -> Result<Self> {
        let settings = config.settings().clone();
        settings.validate()?;

        let recorder = Arc::new(DecisionServiceRecorder::spawn(
            settings.batch.clone(),
            settings.experimental_unit_duration_in_seconds,
            Arc::clone(config.context_serializer()),
            sink,
        )?);

        let mwt = match config.action_resolver() {
            Some(resolver) => MwtExplorer::with_action_resolver(
                &settings.app_id,
                recorder.clone(),
                Arc::clone(resolver),
            ),
            None => MwtExplorer::new(&settings.app_id, recorder.clone()),
        };

        info!(app_id = %settings.app_id, "decision service started");
        Ok(Self {
            explorer: Arc::clone(config.explorer()),
            settings,
            mwt,
            recorder,
        })
    }
}

impl<C> DecisionService<C> {
    /// Chooses actions for `unique_key`; recordable decisions are queued for
    /// upload without blocking.
    pub fn choose_action(
        &self,
        unique_key: &str,
        context: &C,
    ) -> std::result::Result<Vec<u32>, ExploreError> {
        self.mwt
            .choose_action(self.explorer.as_ref(), unique_key, context)
    }

    pub fn try_report_reward(&self, reward: f32, unique_key: &str) -> bool {
        self.recorder.try_report_reward(reward, unique_key)
    }

    pub async fn report_reward(&self, reward: f32, unique_key: &str) -> bool {
        self.recorder.report_reward(reward, unique_key).await
    }

    pub fn try_report_outcome(&self, outcome_json: &str, unique_key: &str) -> bool {
        self.recorder.try_report_outcome(outcome_json, unique_key)
    }

    pub async fn report_outcome(&self, outcome_json: &str, unique_key: &str) -> bool {
        self.recorder.report_outcome(outcome_json, unique_key).await
    }

    /// Drains every queued event; see [`DecisionServiceRecorder::flush`].
    pub async fn flush(&self) {
        self.recorder.flush().await;
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        self.recorder.metrics()
    }
}
