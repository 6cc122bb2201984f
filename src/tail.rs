//! Follows a growing file and emits complete lines.
//!
//! Watching starts at the end of the file: content already present is never
//! replayed. The tail polls for growth, splits appended bytes on `\n`, and
//! sends each line on a bounded channel. When the tail stops, for any reason,
//! the sender is dropped; the receiver seeing `None` is the close notification.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lines buffered between the tail and its consumer.
pub const CHANNEL_CAPACITY: usize = 1024;

/// File tail configuration.
#[derive(Debug, Clone)]
pub struct FileTail {
    path: PathBuf,
    poll_interval: Duration,
    max_line_len: usize,
}

impl FileTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_line_len: crate::limits::ParseLimits::default().max_line_len,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lines longer than this are dropped whole.
    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max;
        self
    }

    /// Open the file, remember its current end, and start following it.
    ///
    /// Anything appended after this returns will be delivered.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub async fn start(self) -> std::io::Result<(mpsc::Receiver<String>, JoinHandle<()>)> {
        let mut file = File::open(&self.path).await?;
        let pos = file.seek(SeekFrom::End(0)).await?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            let path = self.path.clone();
            if let Err(err) = self.follow(file, pos, tx).await {
                tracing::error!(path = %path.display(), error = %err, "tail failed");
            }
        });

        Ok((rx, handle))
    }

    async fn follow(self, mut file: File, mut pos: u64, tx: mpsc::Sender<String>) -> std::io::Result<()> {
        let mut lines = LineBuffer::new(self.max_line_len);
        let mut buf = vec![0u8; 8192];
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => return Ok(()),
            }

            let len = tokio::fs::metadata(&self.path).await?.len();
            if len < pos {
                tracing::debug!(path = %self.path.display(), "file shrank, resuming at new end");
                pos = file.seek(SeekFrom::End(0)).await?;
                lines = LineBuffer::new(self.max_line_len);
                continue;
            }

            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                pos += n as u64;
                for line in lines.push(&buf[..n]) {
                    if tx.send(line).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Reassembles lines from arbitrary byte chunks.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_len: usize,
    /// Set while skipping the rest of an over-long line.
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_len,
            discarding: false,
        }
    }

    /// Feed bytes; returns every line completed by them.
    ///
    /// A trailing `\r` is stripped. Invalid UTF-8 is replaced, not rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();

        for piece in chunk.split_inclusive(|&b| b == b'\n') {
            let complete = piece.last() == Some(&b'\n');
            let body = if complete { &piece[..piece.len() - 1] } else { piece };

            if !self.discarding {
                if self.pending.len() + body.len() > self.max_line_len {
                    self.pending.clear();
                    self.discarding = true;
                } else {
                    self.pending.extend_from_slice(body);
                }
            }

            if complete {
                if !self.discarding {
                    let mut line = std::mem::take(&mut self.pending);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    out.push(String::from_utf8_lossy(&line).into_owned());
                }
                self.discarding = false;
            }
        }

        out
    }
}
