//! Data file reconciler.
//!
//! Change detection is fingerprint-driven: the digest of the declared
//! content, filename and metadata is stored next to the remote file id
//! after every upload. A differing digest means the remote file is stale
//! and gets replaced (delete old, upload new). Drift is checked before
//! the processing poll, so a file edited mid-processing is replaced right
//! away.
//!
//! A crash between a successful upload and the signal write leaves no
//! record of the new file, and the next cycle uploads again. The remote
//! API offers no idempotency key to prevent that duplicate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use steward_core::fingerprint::fingerprint;
use steward_core::lifecycle::{DrainOutcome, Observed, Signals, SyncOutcome};
use steward_core::remote::{AssistantService, FileStatus, Metadata, UploadFile};
use steward_remote::StagedFile;
use tracing::{debug, error, info, warn};

use crate::Reconciler;

pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(15);

/// Persisted data file signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFileSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
}

impl Signals for DataFileSignals {
    fn merge(&mut self, update: Self) {
        if update.content_hash.is_some() {
            self.content_hash = update.content_hash;
        }
        if update.file_id.is_some() {
            self.file_id = update.file_id;
        }
        if update.status.is_some() {
            self.status = update.status;
        }
    }
}

/// Declared data file configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredDataFile {
    /// Local name of the resource
    pub key: String,
    pub assistant: String,
    pub content: String,
    pub filename: Option<String>,
    pub metadata: Metadata,
}

impl DesiredDataFile {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.content, self.filename.as_deref(), &self.metadata)
    }
}

/// What one cycle is going to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DataFileStep {
    /// Nothing uploaded yet
    Upload,
    /// Declared inputs changed since the last upload
    Replace { old_file_id: Option<String> },
    /// Same inputs, remote still processing
    Poll { file_id: String },
    /// Same inputs, remote file available
    Settle,
    /// Same inputs, recorded status the reconciler cannot act on
    Unexpected(Option<FileStatus>),
}

/// Decide the step from the persisted signals and the desired fingerprint.
pub fn plan(signals: &DataFileSignals, desired_hash: &str) -> DataFileStep {
    let Some(stored) = &signals.content_hash else {
        return DataFileStep::Upload;
    };

    if stored != desired_hash {
        return DataFileStep::Replace {
            old_file_id: signals.file_id.clone(),
        };
    }

    match (&signals.status, &signals.file_id) {
        (Some(FileStatus::Processing), Some(id)) => DataFileStep::Poll { file_id: id.clone() },
        (Some(FileStatus::Available), _) => DataFileStep::Settle,
        (status, _) => DataFileStep::Unexpected(status.clone()),
    }
}

pub struct DataFileReconciler {
    desired: DesiredDataFile,
    remote: Arc<dyn AssistantService>,
    poll_delay: Duration,
}

impl DataFileReconciler {
    pub fn new(desired: DesiredDataFile, remote: Arc<dyn AssistantService>) -> Self {
        Self {
            desired,
            remote,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn desired(&self) -> &DesiredDataFile {
        &self.desired
    }

    async fn upload(&self, hash: String) -> SyncOutcome<DataFileSignals> {
        let desired = &self.desired;
        let staged = match StagedFile::write(&desired.content, desired.filename.as_deref()) {
            Ok(staged) => staged,
            Err(e) => {
                error!(file = %desired.key, error = %e, "Failed to stage upload");
                return SyncOutcome::failed(format!("Upload failed: {e}"));
            }
        };

        let upload = UploadFile {
            path: staged.path().to_path_buf(),
            metadata: desired.metadata.clone(),
        };
        let result = self.remote.upload_file(&desired.assistant, upload).await;
        staged.close();

        match result {
            Ok(info) => {
                info!(file = %desired.key, file_id = %info.id, status = %info.status, "File uploaded");
                SyncOutcome::in_progress("File uploaded, processing...", self.poll_delay).with_signals(
                    DataFileSignals {
                        content_hash: Some(hash),
                        file_id: Some(info.id),
                        status: Some(info.status),
                    },
                )
            }
            Err(e) => {
                error!(file = %desired.key, error = %e, "Upload failed");
                SyncOutcome::failed(format!("Upload failed: {e}"))
            }
        }
    }

    async fn replace(&self, old_file_id: Option<String>, hash: String) -> SyncOutcome<DataFileSignals> {
        if let Some(old) = old_file_id {
            info!(file = %self.desired.key, file_id = %old, "Declared content changed, replacing file");
            match self.remote.delete_file(&self.desired.assistant, &old).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(file = %self.desired.key, file_id = %old, "Previous file already absent");
                }
                Err(e) => {
                    error!(file = %self.desired.key, file_id = %old, error = %e, "Failed to delete previous file");
                    return SyncOutcome::failed(format!("Failed to delete previous file: {e}"));
                }
            }
        }
        self.upload(hash).await
    }

    async fn poll(&self, file_id: &str) -> SyncOutcome<DataFileSignals> {
        let details = match self.remote.describe_file(&self.desired.assistant, file_id).await {
            Ok(details) => details,
            Err(e) => {
                error!(file = %self.desired.key, file_id = %file_id, error = %e, "Failed to check file status");
                return SyncOutcome::failed(format!("Status check failed: {e}"));
            }
        };

        match details.status {
            FileStatus::Processing => {
                let percent = details.percent_done.unwrap_or(0.0) * 100.0;
                debug!(file = %self.desired.key, percent, "File still processing");
                SyncOutcome::in_progress(format!("Processing in progress ({percent}%)"), self.poll_delay)
            }
            FileStatus::Available => {
                info!(file = %self.desired.key, file_id = %file_id, "File available");
                SyncOutcome::ready().with_signals(DataFileSignals {
                    status: Some(FileStatus::Available),
                    ..Default::default()
                })
            }
            other => {
                error!(
                    file = %self.desired.key,
                    file_id = %file_id,
                    status = %other,
                    error = details.error_message.as_deref().unwrap_or(""),
                    "File processing failed"
                );
                let description = match details.error_message {
                    Some(message) => format!("Processing failed: {message}"),
                    None => "Processing failed, see logs".to_string(),
                };
                SyncOutcome::failed(description)
            }
        }
    }
}

#[async_trait]
impl Reconciler for DataFileReconciler {
    type Signals = DataFileSignals;

    fn resource_key(&self) -> String {
        format!("file:{}", self.desired.key)
    }

    fn owner(&self) -> Option<String> {
        Some(self.desired.assistant.clone())
    }

    async fn sync(&self, observed: &Observed<DataFileSignals>) -> SyncOutcome<DataFileSignals> {
        let hash = self.desired.fingerprint();
        let step = plan(&observed.signals, &hash);
        debug!(file = %self.desired.key, step = ?step, "Data file cycle");

        match step {
            DataFileStep::Upload => self.upload(hash).await,
            DataFileStep::Replace { old_file_id } => self.replace(old_file_id, hash).await,
            DataFileStep::Poll { file_id } => self.poll(&file_id).await,
            DataFileStep::Settle => SyncOutcome::ready(),
            DataFileStep::Unexpected(status) => {
                let status = status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into());
                SyncOutcome::failed(format!("Unexpected status: {status}"))
            }
        }
    }

    async fn drain(&self, observed: &Observed<DataFileSignals>) -> DrainOutcome {
        let Some(file_id) = &observed.signals.file_id else {
            debug!(file = %self.desired.key, "Nothing uploaded, drained");
            return DrainOutcome::Drained;
        };

        match self.remote.delete_file(&self.desired.assistant, file_id).await {
            Ok(()) => {
                info!(file = %self.desired.key, file_id = %file_id, "File deleted");
                DrainOutcome::Drained
            }
            Err(e) if e.is_not_found() => {
                warn!(file = %self.desired.key, file_id = %file_id, "File already absent, treating as drained");
                DrainOutcome::Drained
            }
            Err(e) => {
                error!(file = %self.desired.key, file_id = %file_id, error = %e, "Failed to delete file during drain");
                DrainOutcome::DrainingFailed {
                    reason: format!("Failed to delete file: {e}"),
                }
            }
        }
    }
}
