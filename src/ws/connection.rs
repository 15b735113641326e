//! Send-serializing socket wrapper

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Outbound half of a client socket
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Send failures; every one of them leaves the connection closed
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("write deadline exceeded")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One live session's outbound channel
///
/// Writers take the sink lock for a whole frame so concurrent senders never
/// interleave. Closing is idempotent.
pub struct Connection {
    sink: Mutex<FrameSink>,
    closed: AtomicBool,
    write_timeout: Duration,
}

impl Connection {
    pub fn new<S>(sink: S, write_timeout: Duration) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self {
            sink: Mutex::new(Box::pin(sink)),
            closed: AtomicBool::new(false),
            write_timeout,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Serialize and send one message
    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<(), SendError> {
        let json = serde_json::to_string(msg)?;
        self.send_text(json).await
    }

    /// Send a pre-serialized text frame within the write deadline
    ///
    /// Waiting for an earlier writer counts against the deadline.
    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            if self.is_closed() {
                return Err(SendError::Closed);
            }
            sink.send(Message::Text(text)).await.map_err(SendError::Transport)
        };
        let result = timeout(self.write_timeout, write)
            .await
            .unwrap_or(Err(SendError::Timeout));

        if matches!(result, Err(SendError::Timeout | SendError::Transport(_))) {
            self.closed.store(true, Ordering::Release);
            self.close_sink().await;
        }
        result
    }

    /// Send a frame unless another write is still in flight
    ///
    /// Returns `Ok(false)` when the frame was dropped because the socket is
    /// busy. Meant for state frames, where a newer one is always coming.
    pub async fn send_latest(&self, text: String) -> Result<bool, SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let Ok(mut sink) = self.sink.try_lock() else {
            return Ok(false);
        };
        if self.is_closed() {
            return Err(SendError::Closed);
        }

        let result = match timeout(self.write_timeout, sink.send(Message::Text(text))).await {
            Ok(Ok(())) => return Ok(true),
            Ok(Err(e)) => Err(SendError::Transport(e)),
            Err(_) => Err(SendError::Timeout),
        };

        self.closed.store(true, Ordering::Release);
        let _ = timeout(self.write_timeout, sink.close()).await;
        result
    }

    /// Mark closed and send a close frame; later calls do nothing
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_sink().await;
    }

    /// Best-effort close frame, bounded by the write deadline
    async fn close_sink(&self) {
        let _ = timeout(self.write_timeout, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;
    }

    /// A connection backed by an in-memory channel
    #[cfg(test)]
    pub fn in_memory(
        write_timeout: Duration,
    ) -> (Self, futures::channel::mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        (Self::new(tx.sink_map_err(axum::Error::new), write_timeout), rx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
