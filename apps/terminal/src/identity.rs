//! # Identity Token Reading
//!
//! Tokens come from a producer that may block (stdin, a serial reader) and
//! are consumed by the event loop with a deadline.
//!
//! ```text
//!  reader thread ──(arrived_at, token)──► TokenFeed ─► channel ─► IdentityReader
//!                                                                 read_token(since, deadline)
//!                                                                   │
//!                                  tokens older than `since` ◄──────┤ dropped
//!                                  deadline passes           ◄──────┘ None
//! ```
//!
//! Tokens that arrive while nobody is waiting are never charged later: a
//! read only accepts tokens that arrived after it started.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Producer side. Cheap to clone; each reader thread holds one.
#[derive(Debug, Clone)]
pub struct TokenFeed {
    tx: mpsc::UnboundedSender<(Instant, String)>,
}

impl TokenFeed {
    /// Offers a token. Blank input is ignored. Returns false once the
    /// consumer is gone.
    pub fn offer(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return true;
        }
        self.tx.send((Instant::now(), token.to_string())).is_ok()
    }
}

/// Consumer side, owned by the event loop.
#[derive(Debug)]
pub struct IdentityReader {
    rx: Mutex<mpsc::UnboundedReceiver<(Instant, String)>>,
}

/// Creates a connected feed and reader.
pub fn token_channel() -> (TokenFeed, IdentityReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TokenFeed { tx }, IdentityReader { rx: Mutex::new(rx) })
}

impl IdentityReader {
    /// Waits for a token that arrived at or after `since`.
    ///
    /// ## Returns
    /// * `Some(token)` - Read in time
    /// * `None` - Deadline passed, or every producer is gone
    pub async fn read_token(&self, since: Instant, deadline: Instant) -> Option<String> {
        let mut rx = self.rx.lock().await;
        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((arrived, token))) if arrived >= since => {
                    debug!(token_len = token.len(), "Identity token read");
                    return Some(token);
                }
                Ok(Some(_)) => debug!("Dropping token tapped before the prompt"),
                Ok(None) => {
                    warn!("Token reader disconnected");
                    return None;
                }
                Err(_) => {
                    debug!("Identity read timed out");
                    return None;
                }
            }
        }
    }
}

/// Reads one token per line from a device path on a background thread.
///
/// The thread ends when the device reaches EOF or fails, or when the
/// reader side is dropped.
pub fn spawn_device_reader(path: PathBuf, feed: TokenFeed) -> std::io::Result<thread::JoinHandle<()>> {
    let file = File::open(&path)?;
    info!(path = %path.display(), "Token reader opened");

    thread::Builder::new().name("token-reader".into()).spawn(move || {
        for line in BufReader::new(file).lines() {
            match line {
                Ok(line) => {
                    if !feed.offer(&line) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Token reader failed");
                    break;
                }
            }
        }
        info!(path = %path.display(), "Token reader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_after_deadline() {
        let (_feed, reader) = token_channel();
        let started = Instant::now();

        let token = reader.read_token(started, started + Duration::from_secs(10)).await;

        assert_eq!(token, None);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tokens_are_dropped() {
        let (feed, reader) = token_channel();
        feed.offer("EARLY");
        tokio::time::advance(Duration::from_secs(1)).await;

        let since = Instant::now();
        feed.offer("  ");
        feed.offer("ON-TIME");

        let token = reader.read_token(since, since + Duration::from_secs(10)).await;
        assert_eq!(token.as_deref(), Some("ON-TIME"));
    }

    #[tokio::test]
    async fn test_device_reader_forwards_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader");
        std::fs::write(&path, "CARD1\n\nCARD2\n").unwrap();

        let since = Instant::now();
        let (feed, reader) = token_channel();
        let handle = spawn_device_reader(path, feed).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(reader.read_token(since, deadline).await.as_deref(), Some("CARD1"));
        assert_eq!(reader.read_token(since, deadline).await.as_deref(), Some("CARD2"));
        handle.join().unwrap();
        // Producer gone: reads end immediately
        assert_eq!(reader.read_token(since, deadline).await, None);
    }
}
