//! MJPEG byte stream splitting
//!
//! Camera programs emit concatenated JPEG images with no container framing.
//! Every image starts with the start-of-image marker, so the bytes between
//! two consecutive markers form one complete frame:
//!
//! ```text
//! junk | FF D8 ...frame 1... | FF D8 ...frame 2... | FF D8 ...
//!      ^ sync                ^ emit frame 1        ^ emit frame 2
//! ```
//!
//! Entropy-coded JPEG data byte-stuffs `0xFF`, so `FF D8` never appears
//! inside a baseline image body.

use bytes::BytesMut;

use super::frame::{Frame, SOI_MARKER};

/// Default upper bound for a single accumulated frame (8MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Incremental splitter turning a raw MJPEG byte stream into frames
#[derive(Debug)]
pub struct JpegSplitter {
    /// Bytes of the frame currently being accumulated (starts at its SOI once synced)
    buf: BytesMut,
    /// Offset up to which `buf` has been searched for the next marker
    scanned: usize,
    /// Whether `buf` starts at a marker
    synced: bool,
    /// Frames larger than this are discarded
    max_frame_size: usize,
    /// Frames discarded for exceeding `max_frame_size`
    oversized: u64,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            synced: false,
            max_frame_size,
            oversized: 0,
        }
    }

    /// Append bytes read from the camera
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, if a following marker has arrived
    ///
    /// Call repeatedly after each [`push`](Self::push) until it returns `None`.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if !self.synced && !self.sync() {
            return None;
        }

        // Resume one byte early so a marker split across two reads is found.
        let from = self.scanned.saturating_sub(1).max(SOI_MARKER.len());

        if let Some(pos) = find_marker(&self.buf, from) {
            let frame = self.buf.split_to(pos).freeze();
            self.scanned = SOI_MARKER.len();
            return Some(Frame::new(frame));
        }

        self.scanned = self.buf.len();

        if self.buf.len() > self.max_frame_size {
            self.oversized += 1;
            tracing::warn!(
                size = self.buf.len(),
                max = self.max_frame_size,
                "Dropping oversized frame, resynchronising"
            );
            self.discard_keeping_partial_marker();
            self.scanned = 0;
            self.synced = false;
        }

        None
    }

    /// Number of bytes held for the frame in progress
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of frames dropped for exceeding the size limit
    pub fn oversized_frames(&self) -> u64 {
        self.oversized
    }

    /// Discard leading bytes up to the first marker
    fn sync(&mut self) -> bool {
        match find_marker(&self.buf, 0) {
            Some(pos) => {
                let _ = self.buf.split_to(pos);
                self.synced = true;
                self.scanned = SOI_MARKER.len();
                true
            }
            None => {
                self.discard_keeping_partial_marker();
                false
            }
        }
    }

    /// Drop everything except a trailing 0xFF, which may start a marker
    fn discard_keeping_partial_marker(&mut self) {
        let keep = usize::from(self.buf.last() == Some(&SOI_MARKER[0]));
        let drop = self.buf.len() - keep;
        let _ = self.buf.split_to(drop);
    }
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(SOI_MARKER.len())
        .position(|w| w == SOI_MARKER)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(splitter: &mut JpegSplitter) -> Vec<Frame> {
        std::iter::from_fn(|| splitter.next_frame()).collect()
    }

    #[test]
    fn test_emits_on_next_marker() {
        let mut splitter = JpegSplitter::new();

        splitter.push(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert!(drain(&mut splitter).is_empty());

        splitter.push(&[0xFF, 0xD8, 0x03]);
        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert_eq!(splitter.buffered(), 3);
    }

    #[test]
    fn test_marker_split_across_reads() {
        let mut splitter = JpegSplitter::new();

        splitter.push(&[0xFF, 0xD8, 0xAA, 0xBB, 0xFF]);
        assert!(drain(&mut splitter).is_empty());

        splitter.push(&[0xD8, 0xCC]);
        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0xAA, 0xBB]);
    }

    #[test]
    fn test_first_marker_split_across_reads() {
        let mut splitter = JpegSplitter::new();

        splitter.push(&[0x00, 0x11, 0xFF]);
        assert!(drain(&mut splitter).is_empty());
        splitter.push(&[0xD8, 0x01, 0xFF, 0xD8]);

        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x01]);
    }

    #[test]
    fn test_leading_junk_discarded() {
        let mut splitter = JpegSplitter::new();
        splitter.push(&[0x00, 0x01, 0x02, 0xFF, 0xD8, 0x05, 0xFF, 0xD8]);

        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x05]);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut splitter = JpegSplitter::new();
        splitter.push(&[0xFF, 0xD8, 0x01, 0xFF, 0xD8, 0x02, 0xFF, 0xD8, 0x03]);

        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x01]);
        assert_eq!(frames[1].as_ref(), &[0xFF, 0xD8, 0x02]);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut splitter = JpegSplitter::with_max_frame_size(8);

        splitter.push(&[0xFF, 0xD8]);
        splitter.push(&[0x00; 16]);
        assert!(drain(&mut splitter).is_empty());
        assert_eq!(splitter.oversized_frames(), 1);
        assert_eq!(splitter.buffered(), 0);

        splitter.push(&[0xFF, 0xD8, 0x07, 0xFF, 0xD8]);
        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x07]);
    }

    #[test]
    fn test_oversized_frame_keeps_split_marker() {
        let mut splitter = JpegSplitter::with_max_frame_size(8);

        // The read that overflows ends with the first half of the next marker
        let mut overflowing = vec![0xFF, 0xD8];
        overflowing.extend_from_slice(&[0x00; 7]);
        overflowing.push(0xFF);
        splitter.push(&overflowing);
        assert!(drain(&mut splitter).is_empty());
        assert_eq!(splitter.oversized_frames(), 1);
        assert_eq!(splitter.buffered(), 1);

        splitter.push(&[0xD8, 0x07, 0xFF, 0xD8]);
        let frames = drain(&mut splitter);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0x07]);
    }
}
