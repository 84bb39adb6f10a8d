use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde_json::json;

use crate::config::ServiceSettings;
use crate::error::{DeliveryError, Result};
use crate::event::EventBatch;

/// Destination of closed batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn upload(&self, batch: &EventBatch) -> std::result::Result<(), DeliveryError>;
}

/// Posts batches to the decision service ingestion endpoint.
#[derive(Clone)]
pub struct HttpBatchSink {
    client: Client,
    url: Url,
    token: String,
}

impl HttpBatchSink {
    pub fn new(settings: &ServiceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.connection_timeout())
            .build()?;
        Ok(Self::with_client(
            client,
            settings.post_url()?,
            settings.authorization_token.clone(),
        ))
    }

    pub fn with_client(client: Client, url: Url, token: String) -> Self {
        Self { client, url, token }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Debug for HttpBatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBatchSink")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchSink for HttpBatchSink {
    async fn upload(&self, batch: &EventBatch) -> std::result::Result<(), DeliveryError> {
        let body = batch.to_json()?;
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }
}

/// Appends every batch as one JSON line to a local file.
///
/// Useful for dry runs and debugging without a backend.
#[derive(Clone, Debug)]
pub struct FileBatchSink {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileBatchSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BatchSink for FileBatchSink {
    async fn upload(&self, batch: &EventBatch) -> std::result::Result<(), DeliveryError> {
        let entry = json!({
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "batch": batch,
        });
        let line = serde_json::to_string(&entry)?;
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            append_line(&path, &line)
        })
        .await
        .map_err(|err| DeliveryError::Task(err.to_string()))??;
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
