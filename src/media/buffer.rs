//! Latest-frame broadcast buffer
//!
//! The camera publishes into a single slot; any number of streaming sessions
//! wait for a sequence number newer than the last one they sent.
//!
//! ```text
//!   FrameSource ──publish()──► [ slot: frame, sequence, closed ]
//!                                   │  (one lock, broadcast wake)
//!             ┌─────────────────────┼─────────────────────┐
//!             ▼                     ▼                     ▼
//!   wait_for_next(3)      wait_for_next(7)      wait_for_next(7)
//! ```
//!
//! A slow session never holds the slot: it clones the `Frame` reference out,
//! releases it and then writes. Frames published while it was writing are
//! simply skipped.

use tokio::sync::watch;

use crate::error::{Error, Result};

use super::frame::Frame;

#[derive(Debug, Clone, Default)]
struct Slot {
    frame: Option<Frame>,
    sequence: u64,
    closed: bool,
}

/// Single-slot frame buffer with wait-for-newer semantics
#[derive(Debug)]
pub struct FrameBuffer {
    tx: watch::Sender<Slot>,
}

impl FrameBuffer {
    /// Create an empty buffer (sequence 0, no frame)
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Slot::default());
        Self { tx }
    }

    /// Replace the stored frame and wake every waiter
    ///
    /// Returns the sequence number assigned to the frame. Frames published
    /// after [`close`](Self::close) are dropped and the current sequence is
    /// returned unchanged.
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut sequence = 0;
        self.tx.send_if_modified(|slot| {
            sequence = slot.sequence;
            if slot.closed {
                return false;
            }
            slot.sequence += 1;
            slot.frame = Some(frame);
            sequence = slot.sequence;
            true
        });
        sequence
    }

    /// Wait until a frame newer than `since` is available
    ///
    /// Returns immediately if one was already published. Fails with
    /// [`Error::BufferClosed`] once the buffer is closed.
    pub async fn wait_for_next(&self, since: u64) -> Result<(Frame, u64)> {
        let mut rx = self.tx.subscribe();
        let slot = rx
            .wait_for(|slot| slot.closed || slot.sequence > since)
            .await
            .map_err(|_| Error::BufferClosed)?;

        if slot.closed {
            return Err(Error::BufferClosed);
        }

        match slot.frame {
            Some(ref frame) => Ok((frame.clone(), slot.sequence)),
            None => Err(Error::BufferClosed),
        }
    }

    /// Close the buffer, releasing all current and future waiters
    pub fn close(&self) {
        self.tx.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            slot.closed = true;
            true
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Sequence number of the stored frame (0 before the first publish)
    pub fn sequence(&self) -> u64 {
        self.tx.borrow().sequence
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
