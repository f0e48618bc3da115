//! pgs-batch: durable storage for raw documents

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pgs_client::{batch_file_stem, MetricsDocument};

/// Where raw metrics documents go before a batch may be marked completed.
pub trait DocumentStore: Send + Sync {
    /// Persist `doc` durably and return its location as recorded in the manifest.
    fn put(&self, doc: &MetricsDocument) -> Result<String>;
}

/// `<dir>/batch_NNN.csv`, written atomically. Re-running a batch overwrites.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, batch_index: usize) -> PathBuf {
        self.dir.join(format!("{}.csv", batch_file_stem(batch_index)))
    }
}

impl DocumentStore for FsDocumentStore {
    fn put(&self, doc: &MetricsDocument) -> Result<String> {
        let path = self.path_for(doc.batch_index);
        write_atomic(&path, doc.text.as_bytes())
            .with_context(|| format!("store document for batch {} at {:?}", doc.batch_index, path))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Temp file in the same directory, fsync, rename over `path`, then fsync the
/// directory so the rename itself is durable.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.tmp"));

    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    // Directory handles cannot be opened on every platform.
    if let Ok(d) = File::open(&dir) {
        let _ = d.sync_all();
    }
    Ok(())
}
