//! pgs-client: replay adapter
//!
//! Serves documents downloaded by an earlier run from a directory, one file per
//! batch (`batch_001.csv`, ...). Lets a run be re-executed offline against the
//! exact responses the service gave.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::{Batch, BacktestClient, BacktestSession, DateRange, MetricsDocument, ServiceError};

#[derive(Debug, Clone)]
pub struct ReplayClient {
    dir: PathBuf,
}

impl ReplayClient {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn document_path(&self, batch_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}.csv", crate::batch_file_stem(batch_index)))
    }
}

impl BacktestClient for ReplayClient {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn acquire(&self) -> Result<Box<dyn BacktestSession>, ServiceError> {
        if !self.dir.is_dir() {
            return Err(ServiceError::Rejected(format!(
                "replay directory '{}' does not exist",
                self.dir.display()
            )));
        }
        Ok(Box::new(ReplaySession {
            client: self.clone(),
        }))
    }
}

struct ReplaySession {
    client: ReplayClient,
}

impl BacktestSession for ReplaySession {
    fn run(
        &mut self,
        batch: &Batch,
        _range: &DateRange,
        _timeout: Duration,
    ) -> Result<MetricsDocument, ServiceError> {
        let path = self.client.document_path(batch.index);
        let text = read_document(&path)?;
        debug!(batch = batch.index, path = %path.display(), "replayed document");
        Ok(MetricsDocument {
            batch_index: batch.index,
            text,
        })
    }

    fn close(&mut self) {}
}

fn read_document(path: &Path) -> Result<String, ServiceError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ServiceError::Rejected(format!(
            "no recorded document at '{}'",
            path.display()
        ))),
        Err(e) => Err(ServiceError::Transient(format!(
            "read '{}': {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(index: usize) -> Batch {
        Batch {
            index,
            allocations: Vec::new(),
        }
    }

    #[test]
    fn serves_recorded_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("batch_002.csv"), "Portfolio Allocations\n").unwrap();

        let client = ReplayClient::new(dir.path());
        let mut session = client.acquire().unwrap();
        let range = DateRange::parse("1998-01-01", "2020-12-31").unwrap();
        let doc = session
            .run(&batch(2), &range, Duration::from_secs(1))
            .unwrap();
        assert_eq!(doc.batch_index, 2);
        assert!(doc.text.starts_with("Portfolio Allocations"));
    }

    #[test]
    fn missing_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = ReplayClient::new(dir.path());
        let mut session = client.acquire().unwrap();
        let range = DateRange::parse("1998-01-01", "2020-12-31").unwrap();
        let err = session
            .run(&batch(9), &range, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)), "{err}");
    }

    #[test]
    fn missing_directory_fails_acquire() {
        let client = ReplayClient::new("/definitely/not/here/pgs");
        assert!(client.acquire().is_err());
    }
}
