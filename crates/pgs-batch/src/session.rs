//! pgs-batch: session guard
//!
//! Owns the one service session of a run. Acquires lazily on first use,
//! reuses it across batches, drops it on `SessionExpired`, and closes it on
//! every exit path (including unwinding) via `Drop`.

use pgs_client::{BacktestClient, BacktestSession, ServiceError};
use tracing::{debug, info};

pub struct SessionGuard<'a> {
    client: &'a dyn BacktestClient,
    session: Option<Box<dyn BacktestSession>>,
    acquisitions: usize,
}

impl<'a> SessionGuard<'a> {
    pub fn new(client: &'a dyn BacktestClient) -> Self {
        Self {
            client,
            session: None,
            acquisitions: 0,
        }
    }

    /// The live session, acquiring one if none is held.
    pub fn session(&mut self) -> Result<&mut dyn BacktestSession, ServiceError> {
        if self.session.is_none() {
            let s = self.client.acquire()?;
            self.acquisitions += 1;
            info!(
                client = self.client.name(),
                acquisitions = self.acquisitions,
                "backtest session acquired"
            );
            self.session = Some(s);
        }
        match self.session.as_deref_mut() {
            Some(s) => Ok(s),
            None => Err(ServiceError::SessionExpired),
        }
    }

    /// Close and forget the current session; the next call re-acquires.
    pub fn invalidate(&mut self) {
        if let Some(mut s) = self.session.take() {
            debug!(client = self.client.name(), "dropping expired session");
            s.close();
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    pub fn is_held(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut s) = self.session.take() {
            s.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use pgs_client::{Batch, DateRange, MetricsDocument};

    #[derive(Default)]
    struct Counting {
        acquired: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    struct CountingSession(Arc<AtomicUsize>);

    impl BacktestSession for CountingSession {
        fn run(
            &mut self,
            batch: &Batch,
            _range: &DateRange,
            _timeout: Duration,
        ) -> Result<MetricsDocument, ServiceError> {
            Ok(MetricsDocument {
                batch_index: batch.index,
                text: String::new(),
            })
        }

        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl BacktestClient for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn acquire(&self) -> Result<Box<dyn BacktestSession>, ServiceError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSession(Arc::clone(&self.closed))))
        }
    }

    #[test]
    fn acquires_lazily_and_reuses() {
        let client = Counting::default();
        let mut guard = SessionGuard::new(&client);
        assert!(!guard.is_held());
        assert_eq!(client.acquired.load(Ordering::SeqCst), 0);

        guard.session().unwrap();
        guard.session().unwrap();
        assert_eq!(guard.acquisitions(), 1);
        assert!(guard.is_held());
    }

    #[test]
    fn invalidate_closes_and_next_use_reacquires() {
        let client = Counting::default();
        let mut guard = SessionGuard::new(&client);
        guard.session().unwrap();
        guard.invalidate();
        assert_eq!(client.closed.load(Ordering::SeqCst), 1);
        assert!(!guard.is_held());

        guard.session().unwrap();
        assert_eq!(guard.acquisitions(), 2);
    }

    #[test]
    fn drop_closes_held_session() {
        let client = Counting::default();
        {
            let mut guard = SessionGuard::new(&client);
            guard.session().unwrap();
        }
        assert_eq!(client.closed.load(Ordering::SeqCst), 1);

        // Never acquired: nothing to close.
        drop(SessionGuard::new(&client));
        assert_eq!(client.closed.load(Ordering::SeqCst), 1);
    }
}
