//! Ranged-read byte sources backing an archive.
//!
//! The reader never assumes the whole archive fits in memory: every access
//! is an explicit `(offset, length)` read against a [`ByteSource`]. Remote
//! archives are served over HTTP range requests, local ones from a file.

use crate::{DemError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// An addressable byte store supporting ranged reads.
///
/// Implementations must be safe to call from multiple threads; reads of
/// disjoint ranges are independent with no ordering guarantee between them.
pub trait ByteSource: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

/// Byte source over a remote archive, using HTTP `Range` requests.
pub struct HttpByteSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpByteSource {
    /// Create a source for the archive at `url`.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// The archive URL this source reads from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ByteSource for HttpByteSource {
    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let end = offset + length - 1;
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={offset}-{end}"))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DemError::RangeRead {
                offset,
                length,
                reason: format!("HTTP {status}"),
            });
        }
        let body = response.bytes()?;
        let wanted = length as usize;
        if body.len() == wanted {
            return Ok(body.to_vec());
        }
        // Some servers ignore Range and reply 200 with the whole file.
        let start = offset as usize;
        if body.len() >= start + wanted {
            return Ok(body[start..start + wanted].to_vec());
        }
        Err(DemError::RangeRead {
            offset,
            length,
            reason: format!("short response: {} bytes", body.len()),
        })
    }
}

/// Byte source over a local archive file.
pub struct FileByteSource {
    file: Mutex<File>,
}

impl FileByteSource {
    /// Open the archive file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(File::open(path)?),
        })
    }
}

impl ByteSource for FileByteSource {
    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = self.file.lock().map_err(|_| DemError::LockPoisoned)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Byte source over an in-memory archive (embedded archives and tests).
pub struct MemoryByteSource {
    data: Vec<u8>,
}

impl MemoryByteSource {
    /// Wrap an archive already held in memory.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Total archive size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the archive is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemoryByteSource {
    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if let (Ok(start), Ok(wanted)) = (usize::try_from(offset), usize::try_from(length)) {
            if let Some(end) = start.checked_add(wanted) {
                if end <= self.data.len() {
                    return Ok(self.data[start..end].to_vec());
                }
            }
        }
        Err(DemError::RangeRead {
            offset,
            length,
            reason: "read past end of archive".into(),
        })
    }
}
