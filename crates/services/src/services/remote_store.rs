//! Contract of the remote relational store holding the `samples` table.

use async_trait::async_trait;
use db::models::sample::{RemoteSample, SampleId};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("query failed (http {status}): {message}")]
    Query {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("json error: {0}")]
    Serde(String),
    #[error("no row returned")]
    Empty,
}

impl RemoteError {
    /// True when the backend could not be reached at all, as opposed to
    /// answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

/// Which columns a select returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Columns {
    #[default]
    All,
    IdOnly,
}

/// Filtered select against the sample table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleQuery {
    pub columns: Columns,
    pub brand: Option<String>,
    pub id: Option<SampleId>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl SampleQuery {
    /// Every sample of a brand, most recently created first.
    pub fn for_brand(brand: impl Into<String>) -> Self {
        Self {
            brand: Some(brand.into()),
            newest_first: true,
            ..Self::default()
        }
    }

    pub fn by_id(id: SampleId) -> Self {
        Self {
            id: Some(id),
            limit: Some(1),
            ..Self::default()
        }
    }

    /// Cheapest possible read, used to check the store answers.
    pub fn probe() -> Self {
        Self {
            columns: Columns::IdOnly,
            limit: Some(1),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, query: &SampleQuery) -> Result<Vec<RemoteSample>, RemoteError>;

    /// Insert one row and return it as stored (with its assigned id).
    async fn insert(&self, sample: &RemoteSample) -> Result<RemoteSample, RemoteError>;

    async fn delete(&self, id: &SampleId) -> Result<(), RemoteError>;

    /// Call a stored procedure exposed by the backend.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, RemoteError>;
}
