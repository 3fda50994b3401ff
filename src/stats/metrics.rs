//! Statistics and metrics for streaming sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Frames written to the client
    pub frames_sent: u64,
    /// Published frames the client never saw (it was busy writing)
    pub frames_skipped: u64,
    /// Total bytes written, including multipart framing
    pub bytes_sent: u64,
    /// Connection duration
    pub duration: Duration,
    /// Current bitrate estimate (bits/sec)
    pub bitrate: u64,
}

impl SessionStats {
    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_sent * 8) / secs;
        }
    }

    /// Average delivered frame rate
    pub fn framerate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total requests served
    pub total_requests: u64,
    /// Requests rejected by the connection limit
    pub rejected_requests: u64,
    /// Currently open stream sessions
    pub active_streams: u64,
    /// Total bytes sent to stream clients
    pub total_bytes_sent: u64,
    /// Uptime
    pub uptime: Duration,
}

/// Live server counters shared by request handlers
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    active_streams: AtomicU64,
    total_bytes_sent: AtomicU64,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            total_bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn request_accepted(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a stream session open; the guard marks it closed on drop
    pub fn stream_opened(counters: &Arc<Self>) -> StreamGuard {
        counters.active_streams.fetch_add(1, Ordering::Relaxed);
        StreamGuard {
            counters: Arc::clone(counters),
        }
    }

    pub fn bytes_sent(&self, bytes: u64) {
        self.total_bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the active stream count when dropped
#[derive(Debug)]
pub struct StreamGuard {
    counters: Arc<ServerCounters>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.counters.active_streams.fetch_sub(1, Ordering::Relaxed);
    }
}
