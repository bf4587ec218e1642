//! A live client connection as seen by the rest of the server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use whispee_core::{ConnectionId, SessionId};

/// One connected WebSocket client.
///
/// Outbound frames go through a bounded queue drained by the socket's writer
/// task. The bound session is held by id only; the session itself lives in
/// the `SessionStore`.
pub struct Connection {
    pub id: ConnectionId,
    session_id: Mutex<Option<SessionId>>,
    tx: mpsc::Sender<String>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            session_id: Mutex::new(None),
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a session, replacing any previous binding.
    pub fn bind_session(&self, session_id: SessionId) {
        *self.session_id.lock() = Some(session_id);
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().clone()
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or the writer is gone.
    pub fn send(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    connection_id = %self.id,
                    frame_len = frame.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a frame, waiting for room in the queue.
    pub async fn send_wait(&self, frame: String) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
