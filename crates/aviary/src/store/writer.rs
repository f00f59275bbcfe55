use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::core::{Canary, CanarySink};
use crate::error::Result;

/// Appends canaries to an aviary file, one complete JSON object per write.
///
/// Records are serialized before the lock is taken; the lock covers only the
/// write of that record's bytes, so records never interleave. After a
/// failed write the stream may end in a partial record, and every later
/// write is refused.
#[derive(Debug)]
pub struct AviaryWriter {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
    written: AtomicU64,
    broken: AtomicBool,
}

impl AviaryWriter {
    /// Create or truncate the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            out: Mutex::new(BufWriter::new(file)),
            written: AtomicU64::new(0),
            broken: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a write has failed and the writer refuses further records.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn flush(&self) -> Result<()> {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }

    /// Flush and sync the file, returning the record count.
    pub fn finish(self) -> Result<u64> {
        let written = self.written();
        let out = self.out.into_inner().unwrap_or_else(PoisonError::into_inner);
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(written)
    }
}

impl CanarySink for AviaryWriter {
    fn write(&self, canary: &Canary) -> Result<()> {
        let record = serde_json::to_vec(canary)?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if self.broken.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is unusable after a failed write", self.path.display()),
            )
            .into());
        }
        if let Err(e) = out.write_all(&record) {
            self.broken.store(true, Ordering::Relaxed);
            return Err(e.into());
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
