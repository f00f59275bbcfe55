use json_comments::StripComments;
use serde_json::de::IoRead;
use serde_json::{StreamDeserializer, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{Canary, CanarySource};
use crate::error::Result;

/// Default capacity of the channel feeding the verifier.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Streams canaries back out of an aviary file.
///
/// The file is a concatenation of JSON objects, optionally separated by
/// whitespace and `//`, `#` or `/* */` comments.
#[derive(Debug, Clone)]
pub struct AviaryReader {
    path: PathBuf,
    channel_capacity: usize,
}

impl AviaryReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking iterator over the records of the file.
    pub fn iter(&self) -> Result<CanaryIter> {
        let file = File::open(&self.path)?;
        let stripped = StripComments::new(BufReader::new(file));
        Ok(CanaryIter {
            values: serde_json::Deserializer::from_reader(stripped).into_iter(),
        })
    }
}

impl CanarySource for AviaryReader {
    fn open(&self) -> Result<mpsc::Receiver<Result<Canary>>> {
        let records = self.iter()?;
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut sent = 0u64;
            for record in records {
                if tx.blocking_send(record).is_err() {
                    debug!("Reader for {:?} closed after {} records", path, sent);
                    return;
                }
                sent += 1;
            }
            debug!("Finished reading {} records from {:?}", sent, path);
        });
        Ok(rx)
    }
}

/// Iterator returned by [`AviaryReader::iter`].
///
/// A record that is valid JSON but not a canary yields an `Err` and reading
/// continues; a syntax error yields an `Err` and ends the stream.
pub struct CanaryIter {
    values: StreamDeserializer<'static, IoRead<StripComments<BufReader<File>>>, Value>,
}

impl Iterator for CanaryIter {
    type Item = Result<Canary>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = match self.values.next()? {
            Ok(value) => value,
            Err(e) => return Some(Err(e.into())),
        };
        Some(serde_json::from_value(value).map_err(Into::into))
    }
}
