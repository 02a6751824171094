//! Native messaging host.
//!
//! Talks to the browser extension over a framed byte stream (stdin/stdout in
//! production). A reader task drains incoming frames and a writer task owns
//! the outgoing side, so a slow browser never blocks request bookkeeping.

use crate::codec::{read_frame, write_frame};
use crate::error::HostError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Queue depth for each direction
const CHANNEL_CAPACITY: usize = 64;

/// Requests metadata from the extension and correlates its responses
pub struct NativeMessagingHost {
    outgoing: mpsc::Sender<Value>,
    /// Held for the whole request so only one is in flight
    responses: Mutex<mpsc::Receiver<Value>>,
    next_id: AtomicU64,
    response_timeout: Duration,
    open: watch::Receiver<bool>,
}

impl NativeMessagingHost {
    /// Start the reader and writer tasks over the given stream halves
    pub fn start<R, W>(reader: R, writer: W, response_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (responses_tx, responses_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (open_tx, open_rx) = watch::channel(true);

        tokio::spawn(read_loop(reader, responses_tx, open_tx));
        tokio::spawn(write_loop(writer, outgoing_rx));

        Self {
            outgoing: outgoing_tx,
            responses: Mutex::new(responses_rx),
            next_id: AtomicU64::new(1),
            response_timeout,
            open: open_rx,
        }
    }

    /// Whether the extension side is still readable
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Resolves once the extension closed its side of the channel
    pub async fn closed(&self) {
        let mut open = self.open.clone();
        // A dropped sender means the reader is gone too
        let _ = open.wait_for(|open| !*open).await;
    }

    /// Send `{"action", "id"}` and wait for the matching response's `data`
    ///
    /// Returns `Ok(None)` when no answer arrived within the response timeout.
    pub async fn request(&self, action: &str) -> Result<Option<Value>, HostError> {
        let mut responses = self.responses.lock().await;

        while let Ok(stale) = responses.try_recv() {
            debug!("Discarding stale response: {}", stale);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.outgoing
            .send(json!({ "action": action, "id": id }))
            .await
            .map_err(|_| HostError::Closed)?;
        debug!("Sent {} request #{}", action, id);

        let deadline = Instant::now() + self.response_timeout;
        loop {
            match tokio::time::timeout_at(deadline, responses.recv()).await {
                Ok(Some(record)) => {
                    if record.get("id").and_then(Value::as_u64) != Some(id) {
                        debug!("Discarding stale response: {}", record);
                        continue;
                    }
                    return Ok(Some(record.get("data").cloned().unwrap_or(Value::Null)));
                }
                Ok(None) => return Err(HostError::Closed),
                Err(_) => {
                    warn!(
                        "No response to {} #{} within {:?}",
                        action, id, self.response_timeout
                    );
                    return Ok(None);
                }
            }
        }
    }
}

async fn read_loop<R>(mut reader: R, responses: mpsc::Sender<Value>, open: watch::Sender<bool>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(record)) => {
                if record.get("action").and_then(Value::as_str) == Some("ping") {
                    debug!("Ping from extension");
                    continue;
                }
                if let Err(e) = responses.try_send(record) {
                    warn!("Dropping unsolicited record: {}", e);
                }
            }
            Ok(None) => {
                info!("Extension closed the channel");
                break;
            }
            Err(e) => {
                error!("Failed to read from extension: {}", e);
                break;
            }
        }
    }
    open.send_replace(false);
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::Receiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = outgoing.recv().await {
        if let Err(e) = write_frame(&mut writer, &record).await {
            error!("Failed to write to extension: {}", e);
            break;
        }
    }
}
