//! MJPEG stream dispatcher
//!
//! Drives one `/stream.mjpg` client: the multipart response head is sent
//! once, then the body is an endless stream of parts, each produced by
//! waiting on the [`FrameBuffer`] for a newer frame:
//!
//! ```text
//! --FRAME\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```
//!
//! The server only polls the body when the socket can take more data, so a
//! slow client holds at most one part and simply skips frames. When the
//! client goes away the body is dropped, which ends only this session.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, Stream};

use crate::error::{Error, Result};
use crate::media::{Frame, FrameBuffer};
use crate::server::config::ServerConfig;
use crate::stats::{ServerCounters, StreamGuard};

use super::state::StreamSession;

/// Multipart boundary token
pub const BOUNDARY: &str = "FRAME";

/// Content type of the stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=FRAME";

/// Per-client streaming state
pub struct StreamDispatcher {
    session: StreamSession,
    frames: Arc<FrameBuffer>,
    counters: Arc<ServerCounters>,
    frame_timeout: Option<Duration>,
    _active: StreamGuard,
}

impl StreamDispatcher {
    /// Create a dispatcher for an accepted stream request
    pub fn new(
        session: StreamSession,
        frames: Arc<FrameBuffer>,
        counters: Arc<ServerCounters>,
        config: &ServerConfig,
    ) -> Self {
        tracing::info!(
            session_id = session.id,
            peer = %session.peer_addr,
            "Streaming client added"
        );

        Self {
            session,
            frames,
            _active: ServerCounters::stream_opened(&counters),
            counters,
            frame_timeout: config.frame_timeout,
        }
    }

    /// The multipart response whose body is this session's frames
    pub fn into_response(self) -> Response {
        let body = Body::from_stream(self.into_stream());

        (
            StatusCode::OK,
            [
                (header::AGE, "0"),
                (header::CACHE_CONTROL, "no-cache, private"),
                (header::PRAGMA, "no-cache"),
                (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            ],
            body,
        )
            .into_response()
    }

    /// One encoded part per delivered frame, ending when the session does
    pub fn into_stream(
        mut self,
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send {
        self.session.headers_sent();
        self.session.start_streaming();

        stream::unfold(self, |mut dispatcher| async move {
            let part = dispatcher.next_part().await?;
            Some((Ok(part), dispatcher))
        })
    }

    async fn next_part(&mut self) -> Option<Bytes> {
        match self.next_frame().await {
            Ok((frame, sequence)) => {
                let mut buf = BytesMut::with_capacity(frame.len() + 96);
                encode_part(&mut buf, &frame);

                self.session.on_frame(sequence, buf.len());
                self.counters.bytes_sent(buf.len() as u64);

                tracing::trace!(
                    session_id = self.session.id,
                    sequence = sequence,
                    size = frame.len(),
                    "Sent frame"
                );
                Some(buf.freeze())
            }
            Err(Error::BufferClosed) => {
                tracing::debug!(
                    session_id = self.session.id,
                    peer = %self.session.peer_addr,
                    "Frame buffer closed, ending stream"
                );
                self.session.close();
                None
            }
            Err(e) => {
                tracing::warn!(
                    session_id = self.session.id,
                    peer = %self.session.peer_addr,
                    error = %e,
                    "Removed streaming client"
                );
                self.session.close();
                None
            }
        }
    }

    async fn next_frame(&self) -> Result<(Frame, u64)> {
        let wait = self.frames.wait_for_next(self.session.last_sequence);
        match self.frame_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| Error::Timeout("waiting for next frame"))?,
            None => wait.await,
        }
    }
}

impl Drop for StreamDispatcher {
    fn drop(&mut self) {
        // Dropped mid-stream: the server gave up on the body
        if self.session.is_streaming() {
            tracing::warn!(
                session_id = self.session.id,
                peer = %self.session.peer_addr,
                error = "client disconnected",
                "Removed streaming client"
            );
            self.session.close();
        }

        let stats = self.session.stats();
        tracing::debug!(
            session_id = self.session.id,
            frames_sent = stats.frames_sent,
            frames_skipped = stats.frames_skipped,
            bytes_sent = stats.bytes_sent,
            bitrate = stats.bitrate,
            fps = stats.framerate(),
            duration_ms = stats.duration.as_millis() as u64,
            "Stream session closed"
        );
    }
}

/// Encode one frame as a multipart part
pub fn encode_part(buf: &mut BytesMut, frame: &Frame) {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.len()
    );
    buf.reserve(header.len() + frame.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(frame.data());
    buf.put_slice(b"\r\n");
}
