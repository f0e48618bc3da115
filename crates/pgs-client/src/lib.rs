//! pgs-client
//!
//! Boundary to the remote backtest service.
//!
//! The service is opaque: it accepts a batch of allocations plus a date range
//! and returns a metrics document (sectioned CSV text), or fails. Acquiring a
//! session is expensive (login), so a session is acquired once and reused for
//! every batch of a run.
//!
//! Adapters:
//! - [`HttpBacktestClient`]: JSON over HTTP, blocking reqwest
//! - [`ReplayClient`]: serves previously downloaded `batch_NNN.csv` documents

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pgs_grid::Allocation;

pub mod http;
pub mod replay;

pub use http::HttpBacktestClient;
pub use replay::ReplayClient;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// An ordered, fixed group of allocations submitted together. Index is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub allocations: Vec<Allocation>,
}

impl Batch {
    pub fn names(&self) -> Vec<&str> {
        self.allocations.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn first_name(&self) -> &str {
        self.allocations.first().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn last_name(&self) -> &str {
        self.allocations.last().map(|a| a.name.as_str()).unwrap_or("")
    }

    /// Canonical file stem for everything stored per batch (`batch_007`).
    pub fn file_stem(&self) -> String {
        batch_file_stem(self.index)
    }
}

pub fn batch_file_stem(index: usize) -> String {
    format!("batch_{index:03}")
}

/// Inclusive backtest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ServiceError> {
        if start > end {
            return Err(ServiceError::Rejected(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, ServiceError> {
        let p = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| ServiceError::Rejected(format!("bad date '{s}': {e}")))
        };
        Self::new(p(start)?, p(end)?)
    }
}

/// Raw service output for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsDocument {
    pub batch_index: usize,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Network failure, server error or timeout. Retryable.
    Transient(String),
    /// Throttled. Retry no sooner than `retry_after` when the service says so.
    RateLimited { retry_after: Option<Duration> },
    /// The session is no longer valid. Retryable after re-acquiring.
    SessionExpired,
    /// Malformed or unsupported request. Not retryable.
    Rejected(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ServiceError::Rejected(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Transient(_) => "TRANSIENT",
            ServiceError::RateLimited { .. } => "RATE_LIMITED",
            ServiceError::SessionExpired => "SESSION_EXPIRED",
            ServiceError::Rejected(_) => "REJECTED",
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Transient(msg) => write!(f, "transient service failure: {msg}"),
            ServiceError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited, retry after {}s", d.as_secs()),
            ServiceError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            ServiceError::SessionExpired => write!(f, "session expired"),
            ServiceError::Rejected(msg) => write!(f, "rejected by service: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Factory for sessions. Object-safe so the orchestrator can hold a
/// `&dyn BacktestClient` without knowing the adapter.
pub trait BacktestClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Establish a session (login, warm-up). Expensive; call once per run and
    /// again only after [`ServiceError::SessionExpired`].
    fn acquire(&self) -> Result<Box<dyn BacktestSession>, ServiceError>;
}

pub trait BacktestSession: Send {
    /// Run one batch. Must return within `timeout`; exceeding it is
    /// [`ServiceError::Transient`].
    fn run(
        &mut self,
        batch: &Batch,
        range: &DateRange,
        timeout: Duration,
    ) -> Result<MetricsDocument, ServiceError>;

    /// Release the session. Best effort; must be safe to call twice.
    fn close(&mut self);
}
