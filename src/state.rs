use std::path::PathBuf;
use std::time::{Duration, Instant};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::error::GalleryError;

/// What survives a restart: the last date the viewer was looking at.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedState {
    #[serde(rename = "lastVisibleDate", default, skip_serializing_if = "Option::is_none")]
    pub last_visible_date: Option<NaiveDate>,
}

pub trait StateStore {
    async fn load_last_date(&self) -> Result<Option<NaiveDate>, GalleryError>;
    async fn save_last_date(&mut self, date: NaiveDate) -> Result<(), GalleryError>;
}

pub struct FileStateStore {
    state_path: PathBuf,
}

impl FileStateStore {
    pub fn new(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.state_path
    }

    async fn read_state(&self) -> Result<PersistedState, GalleryError> {
        let file_str = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(x) => x,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PersistedState::default()),
            Err(e) => return Err(GalleryError::StateIOError(e)),
        };
        if file_str.trim().is_empty() {
            return Ok(PersistedState::default());
        }
        let state = serde_json::from_str(&file_str).map_err(GalleryError::StateSerializationError)?;
        Ok(state)
    }
}

impl StateStore for FileStateStore {
    async fn load_last_date(&self) -> Result<Option<NaiveDate>, GalleryError> {
        Ok(self.read_state().await?.last_visible_date)
    }

    async fn save_last_date(&mut self, date: NaiveDate) -> Result<(), GalleryError> {
        let state = PersistedState { last_visible_date: Some(date) };
        let serialized = serde_json::to_string_pretty(&state).map_err(GalleryError::StateSerializationError)?;
        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(GalleryError::StateIOError)?;
        }
        tokio::fs::write(&self.state_path, serialized).await.map_err(GalleryError::StateIOError)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    last_date: Option<NaiveDate>,
    writes: Vec<NaiveDate>,
}

impl InMemoryStateStore {
    pub fn with_last_date(date: NaiveDate) -> Self {
        Self { last_date: Some(date), writes: vec![] }
    }

    /// Every date saved so far, oldest write first.
    pub fn writes(&self) -> &[NaiveDate] {
        &self.writes
    }
}

impl StateStore for InMemoryStateStore {
    async fn load_last_date(&self) -> Result<Option<NaiveDate>, GalleryError> {
        Ok(self.last_date)
    }

    async fn save_last_date(&mut self, date: NaiveDate) -> Result<(), GalleryError> {
        self.last_date = Some(date);
        self.writes.push(date);
        Ok(())
    }
}

/// Holds the latest value until it has been quiet for `delay`. Time is passed in by the caller.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Returns the pending value once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.delay => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
