//! Hot-Reload Supervisor
//!
//! Watches the policy file and swaps a new snapshot into the store when its
//! content changes:
//!
//! ```text
//! Idle → Checking → Unchanged → Idle
//!                 ↘ Reloading → Idle   (swap on success, keep old on failure)
//! ```
//!
//! Change detection compares a SHA-256 of the file content, so the file is
//! only parsed when its bytes differ from the last attempt. A malformed edit
//! or a slow read never replaces the running policy; it is logged, published
//! as `PolicyEvent::ReloadFailed`, and returned as `ReloadOutcome::Failed`.

use crate::error::ConfigError;
use crate::events::{PolicyEvent, PolicyEventBus, ReloadTrigger};
use crate::policy::{ConfigWarning, PolicyLoader, PolicyStore};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Supervisor state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Checking,
    Unchanged,
    Reloading,
}

/// Result of one check/reload attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// Content identical to the last attempt; nothing parsed
    Unchanged,
    /// New policy active at `revision`
    Reloaded {
        revision: u64,
        warnings: Vec<ConfigWarning>,
    },
    /// Previous policy kept
    Failed(ConfigError),
}

/// Future returned by a `PolicySource` read
pub type SourceRead = Pin<Box<dyn Future<Output = std::io::Result<String>> + Send + 'static>>;

/// Where the supervisor reads raw policy content from
pub trait PolicySource: Send + Sync + std::fmt::Debug {
    fn read(&self, path: &Path) -> SourceRead;
}

/// Reads the policy file from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl PolicySource for FileSource {
    fn read(&self, path: &Path) -> SourceRead {
        let path = path.to_path_buf();
        Box::pin(async move { tokio::fs::read_to_string(path).await })
    }
}

/// Periodic and on-demand policy reloader
#[derive(Debug)]
pub struct ReloadSupervisor {
    path: PathBuf,
    source: Arc<dyn PolicySource>,
    loader: PolicyLoader,
    store: Arc<PolicyStore>,
    events: PolicyEventBus,
    state: Mutex<SupervisorState>,

    /// Hash of the last content attempted. The async lock also serializes
    /// timer checks against on-demand reloads.
    last_hash: tokio::sync::Mutex<Option<String>>,
}

impl ReloadSupervisor {
    pub fn new(
        path: impl Into<PathBuf>,
        loader: PolicyLoader,
        store: Arc<PolicyStore>,
        events: PolicyEventBus,
    ) -> Self {
        Self {
            path: path.into(),
            source: Arc::new(FileSource),
            loader,
            store,
            events,
            state: Mutex::new(SupervisorState::Idle),
            last_hash: tokio::sync::Mutex::new(None),
        }
    }

    /// Read policy content through `source` instead of the filesystem
    pub fn with_source(mut self, source: Arc<dyn PolicySource>) -> Self {
        self.source = source;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SupervisorState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Timer path: reload only if the content changed
    pub async fn check_now(&self) -> ReloadOutcome {
        self.run(ReloadTrigger::Timer, false).await
    }

    /// On-demand path: re-read and re-parse regardless of the content hash
    pub async fn force_reload(&self) -> ReloadOutcome {
        self.run(ReloadTrigger::OnDemand, true).await
    }

    /// Spawn the polling loop. The interval and the `hot_reload` switch are
    /// re-read from the active policy before every wait.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        info!("Starting ReloadSupervisor for {}", self.path.display());

        tokio::spawn(async move {
            loop {
                let interval = self.store.current().reload_interval;

                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("ReloadSupervisor stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if !self.store.current().hot_reload {
                    debug!("ReloadSupervisor: hot reload disabled, skipping check");
                    continue;
                }

                // Outcome is already logged and published
                let _ = self.check_now().await;
            }
        })
    }

    async fn run(&self, trigger: ReloadTrigger, force: bool) -> ReloadOutcome {
        let mut last_hash = self.last_hash.lock().await;
        self.set_state(SupervisorState::Checking);

        let timeout = self.store.current().reload_timeout;
        let content = match read_source(self.source.as_ref(), &self.path, timeout).await {
            Ok(content) => content,
            Err(e) => return self.fail(trigger, e),
        };

        let digest = content_hash(&content);
        if !force && last_hash.as_deref() == Some(digest.as_str()) {
            self.set_state(SupervisorState::Unchanged);
            debug!("Policy source unchanged ({})", &digest[..12]);
            self.events.emit(PolicyEvent::Unchanged {
                trigger,
                timestamp: Utc::now(),
            });
            self.set_state(SupervisorState::Idle);
            return ReloadOutcome::Unchanged;
        }

        self.set_state(SupervisorState::Reloading);
        // Record before parsing: an unchanged malformed file is not re-parsed
        // on every tick.
        *last_hash = Some(digest);

        let loaded = match self.loader.parse_str(&content) {
            Ok(loaded) => loaded,
            Err(e) => return self.fail(trigger, e),
        };

        for warning in &loaded.warnings {
            warn!("Policy reload warning: {}", warning);
        }

        // Adaptive weights are runtime-supplied, not file-sourced; carry them over
        let mut policy = loaded.policy;
        let revision = match self.store.update(|current| {
            policy.adaptive_weights = current.adaptive_weights.clone();
            Ok::<_, ConfigError>(policy)
        }) {
            Ok(revision) => revision,
            Err(e) => return self.fail(trigger, e),
        };

        info!(
            "Policy reloaded from {} (revision {}, {} warnings)",
            self.path.display(),
            revision,
            loaded.warnings.len()
        );
        self.events.emit(PolicyEvent::Reloaded {
            revision,
            trigger,
            warnings: loaded.warnings.iter().map(|w| w.to_string()).collect(),
            timestamp: Utc::now(),
        });
        self.set_state(SupervisorState::Idle);

        ReloadOutcome::Reloaded {
            revision,
            warnings: loaded.warnings,
        }
    }

    fn fail(&self, trigger: ReloadTrigger, err: ConfigError) -> ReloadOutcome {
        let revision = self.store.revision();
        match &err {
            ConfigError::Io { .. } | ConfigError::Timeout(_) => {
                error!("Policy reload failed, keeping revision {}: {}", revision, err)
            }
            _ => warn!("Policy reload rejected, keeping revision {}: {}", revision, err),
        }
        self.events.emit(PolicyEvent::ReloadFailed {
            revision,
            trigger,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
        self.set_state(SupervisorState::Idle);
        ReloadOutcome::Failed(err)
    }

    fn set_state(&self, next: SupervisorState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }
}

async fn read_source(
    source: &dyn PolicySource,
    path: &Path,
    timeout: Duration,
) -> Result<String, ConfigError> {
    match tokio::time::timeout(timeout, source.read(path)).await {
        Ok(Ok(content)) => Ok(content),
        Ok(Err(e)) => Err(ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(ConfigError::Timeout(timeout)),
    }
}

/// Hex SHA-256 of the policy source
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
