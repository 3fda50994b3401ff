//! Frame source adapter
//!
//! Reads the camera's raw byte stream, splits it into JPEG frames and
//! publishes each one to the shared [`FrameBuffer`].

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

use super::buffer::FrameBuffer;
use super::jpeg::{JpegSplitter, DEFAULT_MAX_FRAME_SIZE};

/// Default size of a single read from the camera (64KB)
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

/// Pumps frames from a byte stream into a [`FrameBuffer`]
pub struct FrameSource<R> {
    reader: R,
    splitter: JpegSplitter,
    frames: Arc<FrameBuffer>,
    read_size: usize,
    published: u64,
}

impl<R: AsyncRead + Unpin> FrameSource<R> {
    /// Create a source reading from `reader`
    pub fn new(reader: R, frames: Arc<FrameBuffer>) -> Self {
        Self {
            reader,
            splitter: JpegSplitter::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE),
            frames,
            read_size: DEFAULT_READ_SIZE,
            published: 0,
        }
    }

    /// Set the maximum accepted frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.splitter = JpegSplitter::with_max_frame_size(size);
        self
    }

    /// Set the read chunk size
    pub fn read_size(mut self, size: usize) -> Self {
        self.read_size = size.max(1);
        self
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Run until the underlying stream ends or fails
    ///
    /// Never returns `Ok`: end of stream is reported as
    /// [`Error::SourceEnded`], read failures as [`Error::Io`].
    pub async fn run(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; self.read_size];

        loop {
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                tracing::info!(
                    published = self.published,
                    oversized = self.splitter.oversized_frames(),
                    pending = self.splitter.buffered(),
                    "Frame source ended"
                );
                return Err(Error::SourceEnded);
            }

            self.splitter.push(&chunk[..n]);

            while let Some(frame) = self.splitter.next_frame() {
                let size = frame.len();
                let sequence = self.frames.publish(frame);
                self.published += 1;

                tracing::trace!(sequence = sequence, size = size, "Published frame");

                if self.published == 1 {
                    tracing::info!(size = size, "First camera frame received");
                }
            }
        }
    }
}
