//! Bounded capture of an encoder's diagnostic output.
//!
//! ffmpeg rewrites its progress line with bare carriage returns, so stderr is
//! split on both `\r` and `\n`. Progress records are dropped; everything else
//! is kept in a small ring buffer that is only shown to the user when a
//! recording fails.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// Shared tail of the most recent diagnostic lines of one process.
#[derive(Debug, Clone)]
pub struct DiagnosticsBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl DiagnosticsBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

/// ffmpeg's periodic `frame= ... size= ... time= ...` status record.
pub fn is_progress_record(line: &str) -> bool {
    line.contains("time=") && (line.contains("frame=") || line.contains("size="))
}

/// Read `reader` until EOF, appending every non-progress record to `buffer`.
pub async fn drain_into<R>(mut reader: R, buffer: DiagnosticsBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Stopped reading encoder diagnostics");
                break;
            }
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(idx) = pending.iter().position(|&b| matches!(b, b'\n' | b'\r')) {
            let record: Vec<u8> = pending.drain(..=idx).collect();
            keep_record(&record, &buffer);
        }
    }

    if !pending.is_empty() {
        keep_record(&pending, &buffer);
    }
}

fn keep_record(bytes: &[u8], buffer: &DiagnosticsBuffer) {
    let record = String::from_utf8_lossy(bytes);
    let record = record.trim();
    if record.is_empty() || is_progress_record(record) {
        return;
    }
    trace!(line = %record, "encoder");
    buffer.push(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn buffer_keeps_only_the_newest_lines() {
        let buffer = DiagnosticsBuffer::new(2);
        buffer.push("a");
        buffer.push("b");
        buffer.push("c");
        assert_eq!(buffer.snapshot(), vec!["b", "c"]);
    }

    #[test]
    fn recognizes_progress_records() {
        assert!(is_progress_record(
            "frame=  100 fps=25 q=-1.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s"
        ));
        assert!(is_progress_record("size=512kB time=00:00:10.00"));
        assert!(!is_progress_record("time=00:00:10.00"));
        assert!(!is_progress_record("Connection refused"));
    }

    #[tokio::test]
    async fn drains_records_split_on_cr_and_lf() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let _ = tx
                .write_all(b"Input #0\rsize=1kB time=00:00:01.00 frame=1\nerror one\r\nlast")
                .await;
        });

        let buffer = DiagnosticsBuffer::new(8);
        drain_into(rx, buffer.clone()).await;

        assert_eq!(buffer.snapshot(), vec!["Input #0", "error one", "last"]);
    }
}
