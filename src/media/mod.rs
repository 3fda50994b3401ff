//! Camera media pipeline
//!
//! This module provides:
//! - The JPEG [`Frame`] type
//! - The latest-frame [`FrameBuffer`] shared by all streaming clients
//! - MJPEG byte stream splitting
//! - The frame source pump and the camera process adapter

pub mod buffer;
pub mod camera;
pub mod frame;
pub mod jpeg;
pub mod source;

pub use buffer::FrameBuffer;
pub use camera::{Camera, CameraConfig};
pub use frame::{Frame, SOI_MARKER};
pub use jpeg::JpegSplitter;
pub use source::FrameSource;
