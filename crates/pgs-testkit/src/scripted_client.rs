//! Deterministic in-process backtest service.
//!
//! Succeeds by default with [`synthetic_document`]. Failures are scripted per
//! batch: a queue of errors returned before the first success, or one error
//! returned on every call. Every call, acquisition and close is counted.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pgs_client::{BacktestClient, BacktestSession, Batch, DateRange, MetricsDocument, ServiceError};

use crate::documents::synthetic_document;

#[derive(Debug, Default)]
struct State {
    queued: BTreeMap<usize, VecDeque<ServiceError>>,
    always: BTreeMap<usize, ServiceError>,
    acquire_failures: VecDeque<ServiceError>,
    calls: Vec<usize>,
    acquisitions: usize,
    closes: usize,
    next_session: u64,
    live_session: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // Counters stay readable after a panic elsewhere in the test.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail batch `index` with `errors` in order, then succeed.
    pub fn fail_times(self, index: usize, errors: Vec<ServiceError>) -> Self {
        lock(&self.state)
            .queued
            .entry(index)
            .or_default()
            .extend(errors);
        self
    }

    /// Fail every call for batch `index` with `error`.
    pub fn fail_always(self, index: usize, error: ServiceError) -> Self {
        lock(&self.state).always.insert(index, error);
        self
    }

    /// Fail the next acquisitions with `errors` in order.
    pub fn fail_acquire(self, errors: Vec<ServiceError>) -> Self {
        lock(&self.state).acquire_failures.extend(errors);
        self
    }

    /// Batch indexes in call order, one entry per `run`.
    pub fn calls(&self) -> Vec<usize> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_for(&self, index: usize) -> usize {
        lock(&self.state).calls.iter().filter(|i| **i == index).count()
    }

    pub fn acquisitions(&self) -> usize {
        lock(&self.state).acquisitions
    }

    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    /// True while a session handed out by this client is still open.
    pub fn session_open(&self) -> bool {
        lock(&self.state).live_session.is_some()
    }
}

impl BacktestClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn acquire(&self) -> Result<Box<dyn BacktestSession>, ServiceError> {
        let mut st = lock(&self.state);
        if let Some(e) = st.acquire_failures.pop_front() {
            return Err(e);
        }
        st.acquisitions += 1;
        st.next_session += 1;
        let id = st.next_session;
        st.live_session = Some(id);
        Ok(Box::new(ScriptedSession {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    id: u64,
    state: Arc<Mutex<State>>,
    closed: bool,
}

impl BacktestSession for ScriptedSession {
    fn run(
        &mut self,
        batch: &Batch,
        _range: &DateRange,
        _timeout: Duration,
    ) -> Result<MetricsDocument, ServiceError> {
        if self.closed {
            return Err(ServiceError::SessionExpired);
        }
        let mut st = lock(&self.state);
        st.calls.push(batch.index);
        if let Some(e) = st.always.get(&batch.index) {
            return Err(e.clone());
        }
        if let Some(e) = st.queued.get_mut(&batch.index).and_then(|q| q.pop_front()) {
            return Err(e);
        }
        Ok(synthetic_document(batch))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut st = lock(&self.state);
        st.closes += 1;
        if st.live_session == Some(self.id) {
            st.live_session = None;
        }
    }
}
