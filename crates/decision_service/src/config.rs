use mwt_explore::{ActionResolver, Explorer};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, sync::Arc, time::Duration};
use url::Url;

use crate::error::{Result, ServiceError};

/// Endpoint path appended to the service address.
pub const POST_EXPERIMENTAL_UNITS_PATH: &str = "/DecisionService.svc/PostExperimentalUnits";

pub const ENV_AUTHORIZATION_TOKEN: &str = "DECISION_SERVICE_TOKEN";
pub const ENV_SERVICE_ADDRESS: &str = "DECISION_SERVICE_ADDRESS";

const fn default_max_buffer_size_bytes() -> usize {
    4 * 1024 * 1024
}

const fn default_max_duration_ms() -> u64 {
    60_000
}

const fn default_max_event_count() -> usize {
    10_000
}

const fn default_max_upload_queue_capacity() -> usize {
    100
}

const fn default_connection_timeout_secs() -> u64 {
    60
}

fn default_service_address() -> String {
    "http://localhost:1362".to_string()
}

/// Limits for the windowing and upload stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchingConfiguration {
    /// Serialized bytes that close a batch.
    #[serde(default = "default_max_buffer_size_bytes")]
    pub max_buffer_size_bytes: usize,
    /// Length of a batching window in milliseconds.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    /// Events that close a batch.
    #[serde(default = "default_max_event_count")]
    pub max_event_count: usize,
    /// Depth of the ingestion queue and of the upload queue.
    #[serde(default = "default_max_upload_queue_capacity")]
    pub max_upload_queue_capacity: usize,
}

impl Default for BatchingConfiguration {
    fn default() -> Self {
        Self {
            max_buffer_size_bytes: default_max_buffer_size_bytes(),
            max_duration_ms: default_max_duration_ms(),
            max_event_count: default_max_event_count(),
            max_upload_queue_capacity: default_max_upload_queue_capacity(),
        }
    }
}

impl BatchingConfiguration {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max_buffer_size_bytes", self.max_buffer_size_bytes as u64),
            ("max_duration_ms", self.max_duration_ms),
            ("max_event_count", self.max_event_count as u64),
            ("max_upload_queue_capacity", self.max_upload_queue_capacity as u64),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ServiceError::Config(format!("batch.{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Static settings of one decision service client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    /// Namespace for seeding; must be unique per experiment.
    pub app_id: String,
    #[serde(default)]
    pub authorization_token: String,
    #[serde(default)]
    pub experimental_unit_duration_in_seconds: i32,
    /// Reserved for policy updates pushed from the backend.
    #[serde(default)]
    pub is_policy_updatable: bool,
    #[serde(default = "default_service_address")]
    pub service_address: String,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default)]
    pub batch: BatchingConfiguration,
}

// Keeps the bearer token out of logs.
impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("app_id", &self.app_id)
            .field("authorization_token", &"<redacted>")
            .field(
                "experimental_unit_duration_in_seconds",
                &self.experimental_unit_duration_in_seconds,
            )
            .field("is_policy_updatable", &self.is_policy_updatable)
            .field("service_address", &self.service_address)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("batch", &self.batch)
            .finish()
    }
}

impl ServiceSettings {
    pub fn new(app_id: impl Into<String>, authorization_token: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            authorization_token: authorization_token.into(),
            experimental_unit_duration_in_seconds: 0,
            is_policy_updatable: false,
            service_address: default_service_address(),
            connection_timeout_secs: default_connection_timeout_secs(),
            batch: BatchingConfiguration::default(),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Full URL batches are posted to.
    pub fn post_url(&self) -> Result<Url> {
        let base = self.service_address.trim_end_matches('/');
        let url = Url::parse(&format!("{base}{POST_EXPERIMENTAL_UNITS_PATH}"))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ServiceError::Config(format!(
                "service_address must use http or https, got '{other}'"
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(ServiceError::Config("app_id must not be empty".into()));
        }
        if self.connection_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "connection_timeout_secs must be > 0".into(),
            ));
        }
        self.post_url()?;
        self.batch.validate()
    }

    /// Applies `DECISION_SERVICE_TOKEN` and `DECISION_SERVICE_ADDRESS` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_non_empty(ENV_AUTHORIZATION_TOKEN) {
            self.authorization_token = token;
        }
        if let Some(address) = env_non_empty(ENV_SERVICE_ADDRESS) {
            self.service_address = address;
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Loads settings from YAML, applies environment overrides and validates.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<ServiceSettings> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|err| {
        tracing::warn!(path = %path.display(), error = %err, "failed to read settings file");
        err
    })?;
    let mut settings: ServiceSettings = serde_yaml_ng::from_str(&content)?;
    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}

/// Turns a context into the string stored in `Interaction.Context`.
pub type ContextSerializer<C> = Arc<dyn Fn(&C) -> String + Send + Sync>;

/// Everything a [`crate::DecisionService`] needs. Fixed once built.
pub struct DecisionServiceConfiguration<C> {
    settings: ServiceSettings,
    explorer: Arc<dyn Explorer<C>>,
    context_serializer: ContextSerializer<C>,
    action_resolver: Option<ActionResolver<C>>,
}

impl<C: Serialize + 'static> DecisionServiceConfiguration<C> {
    /// Validates `settings`; contexts are serialized with `serde_json`.
    pub fn new(settings: ServiceSettings, explorer: Arc<dyn Explorer<C>>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            explorer,
            context_serializer: Arc::new(|context: &C| {
                serde_json::to_string(context).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "failed to serialize context");
                    "null".to_string()
                })
            }),
            action_resolver: None,
        })
    }
}

impl<C> DecisionServiceConfiguration<C> {
    pub fn with_context_serializer(mut self, serializer: ContextSerializer<C>) -> Self {
        self.context_serializer = serializer;
        self
    }

    pub fn with_action_resolver(mut self, resolver: ActionResolver<C>) -> Self {
        self.action_resolver = Some(resolver);
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn explorer(&self) -> &Arc<dyn Explorer<C>> {
        &self.explorer
    }

    pub fn context_serializer(&self) -> &ContextSerializer<C> {
        &self.context_serializer
    }

    pub fn action_resolver(&self) -> Option<&ActionResolver<C>> {
        self.action_resolver.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    fn clear_env() {
        std::env::remove_var(ENV_AUTHORIZATION_TOKEN);
        std::env::remove_var(ENV_SERVICE_ADDRESS);
    }

    #[test]
    #[serial]
    fn partial_yaml_merges_with_defaults() {
        clear_env();
        let file = write_yaml("app_id: shop\nbatch:\n  max_event_count: 50\n");
        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.app_id, "shop");
        assert_eq!(settings.batch.max_event_count, 50);
        assert_eq!(
            settings.batch.max_buffer_size_bytes,
            default_max_buffer_size_bytes()
        );
        assert_eq!(settings.batch.max_duration(), Duration::from_secs(60));
        assert_eq!(settings.connection_timeout(), Duration::from_secs(60));
        assert_eq!(
            settings.post_url().unwrap().as_str(),
            "http://localhost:1362/DecisionService.svc/PostExperimentalUnits"
        );
    }

    #[test]
    #[serial]
    fn env_overrides_token_and_address() {
        clear_env();
        let file = write_yaml("app_id: shop\nauthorization_token: from-file\n");
        std::env::set_var(ENV_AUTHORIZATION_TOKEN, "from-env");
        std::env::set_var(ENV_SERVICE_ADDRESS, "https://ingest.example/");
        let settings = load_settings(file.path()).unwrap();
        clear_env();

        assert_eq!(settings.authorization_token, "from-env");
        assert_eq!(
            settings.post_url().unwrap().as_str(),
            "https://ingest.example/DecisionService.svc/PostExperimentalUnits"
        );
    }

    #[test]
    #[serial]
    fn unknown_fields_are_rejected() {
        clear_env();
        let file = write_yaml("app_id: shop\nretries: 3\n");
        assert!(matches!(
            load_settings(file.path()),
            Err(ServiceError::Yaml(_))
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut settings = ServiceSettings::new("", "token");
        assert!(matches!(settings.validate(), Err(ServiceError::Config(_))));

        settings.app_id = "shop".into();
        settings.validate().unwrap();

        settings.batch.max_event_count = 0;
        assert!(matches!(settings.validate(), Err(ServiceError::Config(_))));

        settings.batch = BatchingConfiguration::default();
        settings.service_address = "ftp://files.example".into();
        assert!(matches!(settings.validate(), Err(ServiceError::Config(_))));

        settings.service_address = "not a url".into();
        assert!(matches!(settings.validate(), Err(ServiceError::Url(_))));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let settings = ServiceSettings::new("shop", "super-secret");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("shop"));
    }
}
