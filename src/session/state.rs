//! Stream session state machine
//!
//! Tracks one `/stream.mjpg` client from accept to disconnection.

use std::net::SocketAddr;
use std::time::Instant;

use crate::stats::SessionStats;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Request routed to the stream, nothing written yet
    Opened,
    /// Multipart response headers written
    HeadersSent,
    /// Writing frames
    Streaming,
    /// Connection released
    Closed,
}

/// Per-client streaming state
#[derive(Debug)]
pub struct StreamSession {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Sequence number of the last frame written (0 = none yet)
    pub last_sequence: u64,

    /// Frames written
    pub frames_sent: u64,

    /// Sequence numbers skipped because the client was still writing
    pub frames_skipped: u64,

    /// Bytes written, including headers and part framing
    pub bytes_sent: u64,
}

impl StreamSession {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Opened,
            connected_at: Instant::now(),
            last_sequence: 0,
            frames_sent: 0,
            frames_skipped: 0,
            bytes_sent: 0,
        }
    }

    /// Record that the multipart response head was handed to the server
    pub fn headers_sent(&mut self) {
        if self.phase == SessionPhase::Opened {
            self.phase = SessionPhase::HeadersSent;
        }
    }

    /// Enter the frame loop
    pub fn start_streaming(&mut self) {
        if self.phase == SessionPhase::HeadersSent {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// Record a written frame part
    ///
    /// Returns `false` (and records nothing) if `sequence` is not newer than
    /// the last one sent.
    pub fn on_frame(&mut self, sequence: u64, bytes: usize) -> bool {
        if sequence <= self.last_sequence {
            return false;
        }

        if self.last_sequence > 0 {
            self.frames_skipped += sequence - self.last_sequence - 1;
        }

        self.last_sequence = sequence;
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
        true
    }

    /// Close the session
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            frames_sent: self.frames_sent,
            frames_skipped: self.frames_skipped,
            bytes_sent: self.bytes_sent,
            duration: self.duration(),
            bitrate: 0,
        };
        stats.calculate_bitrate();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> StreamSession {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000);
        StreamSession::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = session();
        assert_eq!(state.phase, SessionPhase::Opened);

        // Can't stream before headers
        state.start_streaming();
        assert_eq!(state.phase, SessionPhase::Opened);

        state.headers_sent();
        assert_eq!(state.phase, SessionPhase::HeadersSent);

        state.start_streaming();
        assert!(state.is_streaming());

        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(state.stats().bytes_sent, 0);
    }

    #[test]
    fn test_frame_accounting() {
        let mut state = session();

        assert!(state.on_frame(3, 100));
        assert_eq!(state.frames_skipped, 0);

        assert!(state.on_frame(4, 100));
        assert!(state.on_frame(9, 100));
        assert_eq!(state.frames_skipped, 4);

        // Older or repeated sequence is refused
        assert!(!state.on_frame(9, 100));
        assert!(!state.on_frame(2, 100));

        assert_eq!(state.frames_sent, 3);
        assert_eq!(state.bytes_sent, 300);
        assert_eq!(state.last_sequence, 9);
    }
}
