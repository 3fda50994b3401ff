//! JPEG frame type
//!
//! Frames are handed from the camera pipeline to every streaming client.
//! They wrap `bytes::Bytes`, so cloning a frame only bumps a reference count.

use bytes::Bytes;

/// JPEG start-of-image marker
pub const SOI_MARKER: [u8; 2] = [0xFF, 0xD8];

/// One complete JPEG image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Create a frame from encoded JPEG bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Encoded image bytes (zero-copy via reference counting)
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the encoded image in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let frame = Frame::from(Bytes::from_static(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]));
        assert_eq!(frame.len(), 5);
        assert!(!frame.is_empty());
        assert!(frame.as_ref().starts_with(&SOI_MARKER));
    }

    #[test]
    fn test_clone_shares_data() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0x00]);
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }
}
