//! Polling tail of a single append-only log file.
//!
//! The file is reopened on every read so that rotation (a new file at the
//! same path) and truncation are picked up without holding a handle to a
//! file that no longer exists under that name.

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Device and inode of a file. Only available on Unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Reads lines appended to a file since the last call.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    /// Bytes consumed from the current file.
    offset: u64,
    file_id: Option<FileId>,
    /// Trailing bytes not yet terminated by a newline.
    pending: Vec<u8>,
}

impl LogTail {
    /// Start tailing `path` from its current end. Existing content is never
    /// reported.
    pub async fn open_at_end(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;

        Ok(Self {
            path,
            offset: metadata.len(),
            file_id: FileId::from_metadata(&metadata),
            pending: Vec::new(),
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Complete lines written since the previous call, in file order.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped and invalid UTF-8 is
    /// replaced. Empty lines are reported. A trailing partial line is kept
    /// until its newline arrives. When the file has been replaced or
    /// truncated, reading restarts from its beginning.
    pub async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;
        let len = metadata.len();

        let file_id = FileId::from_metadata(&metadata);
        if file_id != self.file_id {
            debug!(path = %self.path.display(), "Log file replaced, reading from start");
            self.restart();
            self.file_id = file_id;
        } else if len < self.offset {
            debug!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "Log file truncated, reading from start"
            );
            self.restart();
        }

        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;
        self.pending.extend_from_slice(&buf);

        Ok(self.take_complete_lines())
    }

    fn restart(&mut self) {
        self.offset = 0;
        self.pending.clear();
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_end_matches('\r')
                    .to_string()
            })
            .collect()
    }
}
