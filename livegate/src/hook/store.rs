use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use api::event::WebhookPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A webhook whose in-process retries were exhausted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedWebhook {
    #[serde(flatten)]
    pub payload: WebhookPayload,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl FailedWebhook {
    pub fn new(payload: WebhookPayload, error: String) -> Self {
        Self {
            payload,
            error,
            failed_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// JSON array on disk. Writes go through a temp file and a rename, serialized by `write_lock`.
#[derive(Clone, Debug)]
pub struct FailureStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FailureStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load_all(&self) -> Result<Vec<FailedWebhook>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(vec![]),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    pub async fn append(&self, record: FailedWebhook) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;
        records.push(record);
        self.write(&records).await
    }

    pub async fn overwrite(&self, records: &[FailedWebhook]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(records).await
    }

    async fn write(&self, records: &[FailedWebhook]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = tmp_path_for(&self.path);
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    if let Some(ext) = path.extension() {
        let mut ext = ext.to_os_string();
        ext.push(".tmp");
        tmp.set_extension(ext);
    } else {
        tmp.set_extension("tmp");
    }
    tmp
}
