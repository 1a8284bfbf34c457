//! Builds reconcilers and actions from the application config, and runs a
//! whole sync pass: drain what left the config, then converge what is in it.

use std::collections::HashSet;
use std::sync::Arc;
use steward_actions::{
    ActionRegistry, DeleteFileAction, ListFilesAction, RawChatAction, RawChatOptions, RetrieveSnippetsAction,
    SimpleChatAction, UpdateAssistantAction, UploadFileAction,
};
use steward_config::{AppConfig, TimingConfig};
use steward_core::error::{Error, Result};
use steward_core::host::SignalStore;
use steward_core::lifecycle::{DrainOutcome, LifecycleStatus, Observed};
use steward_core::remote::{AssistantService, ContextOptions, Metadata, Region};
use steward_reconcile::{
    AssistantReconciler, AssistantSignals, DataFileReconciler, DataFileSignals, DesiredAssistant, DesiredDataFile,
    Reconciler,
};
use tracing::{info, warn};

use crate::driver::ResourceDriver;

const ASSISTANT_PREFIX: &str = "assistant:";
const FILE_PREFIX: &str = "file:";

/// Everything the config declares, with file content already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub assistant: Option<DesiredAssistant>,
    pub files: Vec<DesiredDataFile>,
}

impl DesiredState {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let assistant = config.assistant.as_ref().map(|a| DesiredAssistant {
            name: a.name.clone(),
            instructions: a.instructions.clone(),
            metadata: a.metadata.clone(),
            region: a.region,
        });

        let mut files = Vec::with_capacity(config.data_files.len());
        for file in &config.data_files {
            let assistant = config.data_file_assistant(file).ok_or_else(|| Error::Config {
                message: format!("data file '{}' has no assistant", file.key),
            })?;
            let content = file.resolve_content().map_err(|e| Error::Config { message: e.to_string() })?;
            files.push(DesiredDataFile {
                key: file.key.clone(),
                assistant: assistant.to_string(),
                content,
                filename: file.filename.clone(),
                metadata: file.metadata.clone(),
            });
        }

        Ok(Self { assistant, files })
    }

    /// Signal store keys of every declared resource.
    pub fn resource_keys(&self) -> HashSet<String> {
        let mut keys: HashSet<String> = self.files.iter().map(|f| format!("{FILE_PREFIX}{}", f.key)).collect();
        if let Some(assistant) = &self.assistant {
            keys.insert(format!("{ASSISTANT_PREFIX}{}", assistant.name));
        }
        keys
    }

    fn default_assistant(&self) -> Option<&str> {
        self.assistant.as_ref().map(|a| a.name.as_str())
    }
}

/// Where one resource ended up after a sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub key: String,
    pub lifecycle: Option<LifecycleStatus>,
    pub description: Option<String>,
}

impl ResourceReport {
    fn from_observed<S>(key: String, observed: &Observed<S>) -> Self {
        Self {
            key,
            lifecycle: observed.lifecycle,
            description: observed.description.clone(),
        }
    }
}

/// Drives every declared resource against one remote and signal store.
pub struct Reconciliation {
    remote: Arc<dyn AssistantService>,
    store: Arc<dyn SignalStore>,
    driver: ResourceDriver,
    timing: TimingConfig,
}

impl Reconciliation {
    pub fn new(remote: Arc<dyn AssistantService>, store: Arc<dyn SignalStore>, timing: TimingConfig) -> Self {
        Self {
            remote,
            driver: ResourceDriver::new(store.clone()),
            store,
            timing,
        }
    }

    pub fn with_driver(mut self, driver: ResourceDriver) -> Self {
        self.driver = driver;
        self
    }

    pub fn assistant_reconciler(&self, desired: DesiredAssistant) -> AssistantReconciler {
        AssistantReconciler::new(desired, self.remote.clone()).with_poll_delay(self.timing.assistant_poll())
    }

    pub fn data_file_reconciler(&self, desired: DesiredDataFile) -> DataFileReconciler {
        DataFileReconciler::new(desired, self.remote.clone()).with_poll_delay(self.timing.file_poll())
    }

    /// One full pass. Resources that left the config are drained first
    /// (files before assistants); data files are only converged once their
    /// assistant is ready.
    pub async fn sync_all(&self, desired: &DesiredState) -> Result<Vec<ResourceReport>> {
        let mut reports = self.prune(desired).await?;

        let mut assistant_ready = true;
        if let Some(assistant) = &desired.assistant {
            let reconciler = self.assistant_reconciler(assistant.clone());
            let observed = self.driver.drive(&reconciler).await?;
            assistant_ready = observed.lifecycle == Some(LifecycleStatus::Ready);
            reports.push(ResourceReport::from_observed(reconciler.resource_key(), &observed));
        }

        for file in &desired.files {
            let reconciler = self.data_file_reconciler(file.clone());
            let key = reconciler.resource_key();
            let owned_by_default = desired.default_assistant() == Some(file.assistant.as_str());

            if owned_by_default && !assistant_ready {
                warn!(resource = %key, assistant = %file.assistant, "Assistant not ready, skipping data file");
                let observed: Observed<DataFileSignals> = self.driver.load(&key).await?;
                reports.push(ResourceReport::from_observed(key, &observed));
                continue;
            }

            self.evict_from_previous_owner(file).await?;
            let observed = self.driver.drive(&reconciler).await?;
            reports.push(ResourceReport::from_observed(key, &observed));
        }

        Ok(reports)
    }

    /// Drain every stored resource the config no longer declares.
    async fn prune(&self, desired: &DesiredState) -> Result<Vec<ResourceReport>> {
        let declared = desired.resource_keys();
        let mut orphans: Vec<String> = self
            .store
            .resources()
            .await?
            .into_iter()
            .filter(|key| !declared.contains(key))
            .collect();
        // Files first: deleting an assistant takes its files with it
        orphans.sort_by_key(|key| !key.starts_with(FILE_PREFIX));

        let mut reports = Vec::new();
        for key in orphans {
            info!(resource = %key, "Resource no longer declared, draining");
            let outcome = self.drain_key(&key, desired).await?;
            reports.push(ResourceReport {
                key,
                lifecycle: Some(outcome.status()),
                description: outcome.reason().map(str::to_string),
            });
        }
        Ok(reports)
    }

    /// A declared file whose assistant changed is deleted from the old one
    /// before it is uploaded to the new one.
    async fn evict_from_previous_owner(&self, file: &DesiredDataFile) -> Result<()> {
        let key = format!("{FILE_PREFIX}{}", file.key);
        let observed: Observed<DataFileSignals> = self.driver.load(&key).await?;
        let Some(previous) = observed.owner.filter(|owner| *owner != file.assistant) else {
            return Ok(());
        };

        info!(resource = %key, from = %previous, to = %file.assistant, "Data file moved, removing old copy");
        let stale = DesiredDataFile {
            assistant: previous,
            ..file.clone()
        };
        match self.driver.drain(&self.data_file_reconciler(stale)).await? {
            DrainOutcome::Drained => Ok(()),
            DrainOutcome::DrainingFailed { reason } => Err(Error::Internal(format!("cannot move {key}: {reason}"))),
        }
    }

    /// Drain one resource by its signal store key, declared or not.
    pub async fn drain_key(&self, key: &str, desired: &DesiredState) -> Result<DrainOutcome> {
        if let Some(name) = key.strip_prefix(ASSISTANT_PREFIX) {
            let target = desired
                .assistant
                .clone()
                .filter(|a| a.name == name)
                .unwrap_or_else(|| DesiredAssistant {
                    name: name.to_string(),
                    instructions: String::new(),
                    metadata: Metadata::new(),
                    region: Region::default(),
                });
            let outcome = self.driver.drain(&self.assistant_reconciler(target)).await?;
            if outcome == DrainOutcome::Drained {
                self.forget_files_of(name).await?;
            }
            return Ok(outcome);
        }

        if let Some(file_key) = key.strip_prefix(FILE_PREFIX) {
            let target = match desired.files.iter().find(|f| f.key == file_key) {
                Some(file) => file.clone(),
                None => {
                    // Undeclared: only the snapshot knows which assistant holds it
                    let observed: Observed<DataFileSignals> = self.driver.load(key).await?;
                    let assistant = match observed.owner {
                        Some(owner) => owner,
                        None if observed.signals.file_id.is_none() => String::new(),
                        None => {
                            return self
                                .driver
                                .record_drain_failure::<DataFileSignals>(
                                    key,
                                    "Failed to delete file: owning assistant is unknown",
                                )
                                .await;
                        }
                    };
                    DesiredDataFile {
                        key: file_key.to_string(),
                        assistant,
                        content: String::new(),
                        filename: None,
                        metadata: Metadata::new(),
                    }
                }
            };
            return self.driver.drain(&self.data_file_reconciler(target)).await;
        }

        Err(Error::Validation(format!("unknown resource key '{key}'")))
    }

    /// Deleting an assistant deletes its files remotely, so their snapshots
    /// no longer describe anything.
    async fn forget_files_of(&self, assistant: &str) -> Result<()> {
        for key in self.store.resources().await? {
            if !key.starts_with(FILE_PREFIX) {
                continue;
            }
            let observed: Observed<DataFileSignals> = self.driver.load(&key).await?;
            if observed.owner.as_deref() == Some(assistant) {
                self.store.remove(&key).await?;
                info!(resource = %key, assistant, "Forgot file of drained assistant");
            }
        }
        Ok(())
    }

    /// Every stored resource with its last recorded status.
    pub async fn status(&self) -> Result<Vec<ResourceReport>> {
        recorded_status(self.store.clone()).await
    }
}

/// Every resource in `store` with its last recorded status. Reads the
/// store only; no remote calls.
pub async fn recorded_status(store: Arc<dyn SignalStore>) -> Result<Vec<ResourceReport>> {
    let driver = ResourceDriver::new(store.clone());
    let mut reports = Vec::new();
    for key in store.resources().await? {
        let report = if key.starts_with(ASSISTANT_PREFIX) {
            let observed: Observed<AssistantSignals> = driver.load(&key).await?;
            ResourceReport::from_observed(key, &observed)
        } else {
            let observed: Observed<DataFileSignals> = driver.load(&key).await?;
            ResourceReport::from_observed(key, &observed)
        };
        reports.push(report);
    }
    Ok(reports)
}

/// Raw chat with the configured knobs and an optional metadata filter.
pub fn raw_chat_action(config: &AppConfig, assistant: &str, filter: Option<serde_json::Value>) -> RawChatAction {
    let chat = &config.chat;
    let options = RawChatOptions {
        temperature: chat.temperature,
        filter,
        json_response: chat.json_response,
        include_highlights: chat.include_highlights,
        top_k: chat.top_k,
        context_options: chat.snippet_size.map(|size| ContextOptions {
            top_k: chat.top_k,
            snippet_size: Some(size),
        }),
    };
    RawChatAction::new(assistant, options)
        .with_model(chat.model.clone())
        .with_timeout(chat.timeout())
}

/// Every action, configured for `assistant`.
pub fn registry_from_config(config: &AppConfig, assistant: &str) -> ActionRegistry {
    let chat = &config.chat;
    let timing = &config.timing;

    let mut snippets = RetrieveSnippetsAction::new(assistant);
    if let Some(top_k) = chat.top_k {
        snippets = snippets.with_top_k(top_k);
    }

    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(
        UploadFileAction::new(assistant).with_delays(timing.upload_initial(), timing.upload_poll()),
    ));
    registry.register(Arc::new(
        SimpleChatAction::new(assistant)
            .with_model(chat.model.clone())
            .with_ttl(chat.ttl())
            .with_timeout(chat.timeout()),
    ));
    registry.register(Arc::new(raw_chat_action(config, assistant, None)));
    registry.register(Arc::new(snippets));
    registry.register(Arc::new(ListFilesAction::new(assistant)));
    registry.register(Arc::new(DeleteFileAction::new(assistant)));
    registry.register(Arc::new(UpdateAssistantAction::new(assistant)));
    registry
}
