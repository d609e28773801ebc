//! Durable homes for [`BudgetState`]
//!
//! The tracker only ever talks to the [`BudgetStore`] trait, so where the record
//! lives (local file, key-value store, parameter store) can change without
//! touching the accounting logic.
//!
//! Read-modify-write goes through [`BudgetStore::update`], which runs under a
//! lock owned by the store. Trackers sharing a store therefore never lose an
//! update, and [`FileBudgetStore`] extends that to other processes with an
//! advisory lock on a sidecar `.lock` file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::error::{BudgetError, BudgetResult};

/// Spend for one UTC day
///
/// Persisted as `{ "date": "2025-01-31", "spent": 0.0123, "daily_limit": 3.0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub date: NaiveDate,
    pub spent: f64,
    pub daily_limit: f64,
}

impl BudgetState {
    pub fn fresh(date: NaiveDate, daily_limit: f64) -> Self {
        Self {
            date,
            spent: 0.0,
            daily_limit,
        }
    }
}

/// Outcome of an [`update`](BudgetStore::update) step
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Hand the record back without writing it
    Keep(BudgetState),
    /// Persist the record, then hand it back
    Write(BudgetState),
}

impl Transition {
    pub fn into_state(self) -> BudgetState {
        match self {
            Transition::Keep(state) | Transition::Write(state) => state,
        }
    }
}

/// Step applied to the stored record (`None` when nothing is stored yet)
pub type UpdateFn<'a> = Box<dyn FnOnce(Option<BudgetState>) -> Transition + Send + 'a>;

/// Access to the persisted budget record
///
/// `load` returns `None` when nothing has been stored yet. `update` is the only
/// way to read-modify-write: load, `apply` and save happen under the store's
/// lock as one step.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn load(&self) -> BudgetResult<Option<BudgetState>>;

    async fn save(&self, state: &BudgetState) -> BudgetResult<()>;

    async fn update(&self, apply: UpdateFn<'_>) -> BudgetResult<BudgetState>;
}

/// JSON file on local disk
pub struct FileBudgetStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBudgetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> BudgetError {
        BudgetError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    async fn ensure_parent(&self) -> BudgetResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    /// Exclusive advisory lock shared with other processes using the same path.
    /// The state file itself is replaced on every save, so the lock lives on a
    /// sidecar file. Dropping the handle releases it.
    async fn lock_file(&self) -> BudgetResult<File> {
        self.ensure_parent().await?;

        let lock_path = self.sibling(".lock");
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| BudgetError::Backend(format!("budget lock task failed: {e}")))?;

        locked.map_err(|e| self.io_error(e))
    }

    async fn read(&self) -> BudgetResult<Option<BudgetState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no budget state at {}, starting fresh", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_str::<BudgetState>(&raw) {
            Ok(state) => {
                trace!("loaded budget state {state:?}");
                Ok(Some(state))
            }
            Err(e) => {
                warn!(
                    "failed to parse budget state at {}: {e}, starting fresh",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    async fn write(&self, state: &BudgetState) -> BudgetResult<()> {
        self.ensure_parent().await?;

        let encoded = serde_json::to_string_pretty(state)?;

        // write-then-rename so a crash never leaves a half-written record
        let temp = self.sibling(".tmp");

        tokio::fs::write(&temp, encoded)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        trace!("saved budget state to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for FileBudgetStore {
    async fn load(&self) -> BudgetResult<Option<BudgetState>> {
        self.read().await
    }

    async fn save(&self, state: &BudgetState) -> BudgetResult<()> {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;
        self.write(state).await
    }

    async fn update(&self, apply: UpdateFn<'_>) -> BudgetResult<BudgetState> {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;

        match apply(self.read().await?) {
            Transition::Keep(state) => Ok(state),
            Transition::Write(state) => {
                self.write(&state).await?;
                Ok(state)
            }
        }
    }
}

/// Process-local store, for tests and dry runs
#[derive(Default)]
pub struct MemoryBudgetStore {
    state: Mutex<Option<BudgetState>>,
}

impl MemoryBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: BudgetState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

#[async_trait]
impl BudgetStore for MemoryBudgetStore {
    async fn load(&self) -> BudgetResult<Option<BudgetState>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &BudgetState) -> BudgetResult<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    async fn update(&self, apply: UpdateFn<'_>) -> BudgetResult<BudgetState> {
        let mut stored = self.state.lock().await;
        match apply((*stored).clone()) {
            Transition::Keep(state) => Ok(state),
            Transition::Write(state) => {
                *stored = Some(state.clone());
                Ok(state)
            }
        }
    }
}
