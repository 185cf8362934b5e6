//! Forwarding of child stderr into `tracing`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

/// Number of stderr lines retained per child by default.
pub const DEFAULT_TAIL_LINES: usize = 32;

/// Bounded buffer holding the most recent stderr lines of a child.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Spawn a task draining `reader` line by line until EOF.
    ///
    /// Every line is logged under `label`; lines mentioning an error are
    /// logged at warn level. The child never blocks on a full stderr pipe.
    pub fn forward<R>(reader: R, label: impl Into<String>, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = Self::new(capacity);
        let sink = tail.clone();
        let label = label.into();

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.contains("Error") || line.contains("error") {
                            warn!(process = %label, "{}", line);
                        } else {
                            debug!(process = %label, "{}", line);
                        }
                        sink.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(process = %label, error = %e, "stderr stream closed");
                        break;
                    }
                }
            }
        });

        tail
    }

    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tail_keeps_most_recent_lines() {
        let tail = StderrTail::new(2);
        tail.push("one".to_string());
        tail.push("two".to_string());
        tail.push("three".to_string());

        assert_eq!(tail.snapshot(), vec!["two".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let tail = StderrTail::new(0);
        tail.push("ignored".to_string());
        assert!(tail.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_forward_reads_until_eof() {
        let input: &'static [u8] = b"first\nInput error: boom\nlast\n";
        let tail = StderrTail::forward(input, "test", 8);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tail.snapshot().len() < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            tail.snapshot(),
            vec![
                "first".to_string(),
                "Input error: boom".to_string(),
                "last".to_string()
            ]
        );
    }
}
