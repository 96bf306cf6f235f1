use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::error::{ClientError, ErrorKind};

/// Lifecycle of the dashboard snapshot resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Loading,
    Ready,
    Refreshing,
    /// Last fetch failed. `stale` is true when an older snapshot is still published.
    Failed { stale: bool },
    /// Torn down; nothing will be published again.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn from_client_error(err: &ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            status: err.status(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncControl {
    pub loading: bool,
    pub refreshing: bool,
    pub error: Option<ErrorInfo>,
    pub auto_refresh_enabled: bool,
    #[serde(serialize_with = "serialize_millis", rename = "intervalMs")]
    pub interval: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub control: SyncControl,
}

/// State of one narrow read, keyed by its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for SliceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            fetched_at: None,
        }
    }
}
