//! Backing sources the dashboard polls.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::FeedRow;
use crate::store::{LogStore, StoreError};
use crate::telemetry::{TelemetryError, ThingSpeakFeed};

// ---

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] TelemetryError),

    #[error("source read task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Something the poller can read the full reading history from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Read every available row, oldest first.
    async fn fetch(&self) -> Result<Vec<FeedRow>, SourceError>;
}

/// The local CSV log store written by the walker.
#[derive(Debug, Clone)]
pub struct CsvSource {
    store: LogStore,
}

impl CsvSource {
    pub fn new(store: LogStore) -> Self {
        CsvSource { store }
    }
}

#[async_trait]
impl DataSource for CsvSource {
    fn describe(&self) -> String {
        format!("log store {}", self.store.path().display())
    }

    async fn fetch(&self) -> Result<Vec<FeedRow>, SourceError> {
        // ---
        let store = self.store.clone();
        let rows = tokio::task::spawn_blocking(move || store.read_rows()).await??;
        Ok(rows)
    }
}

/// The remote channel feed, bounded to its most recent `results` entries.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    feed: Arc<ThingSpeakFeed>,
    channel_id: String,
    max_rows: usize,
}

impl RemoteSource {
    pub fn new(feed: ThingSpeakFeed, channel_id: impl Into<String>, max_rows: usize) -> Self {
        RemoteSource {
            feed: Arc::new(feed),
            channel_id: channel_id.into(),
            max_rows,
        }
    }
}

#[async_trait]
impl DataSource for RemoteSource {
    fn describe(&self) -> String {
        format!("remote channel {}", self.channel_id)
    }

    async fn fetch(&self) -> Result<Vec<FeedRow>, SourceError> {
        // ---
        let mut rows = self.feed.fetch().await?;
        if rows.len() > self.max_rows {
            rows.drain(..rows.len() - self.max_rows);
        }
        Ok(rows)
    }
}
