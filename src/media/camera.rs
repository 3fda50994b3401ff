//! Camera process adapter
//!
//! The camera itself is an external program that writes an MJPEG byte stream
//! to stdout (by default `rpicam-vid` on a Raspberry Pi). This module builds
//! its command line from [`CameraConfig`] and exposes the stdout pipe as the
//! frame source input.

use std::process::Stdio;

use tokio::process::{Child, ChildStdout, Command};

use crate::error::{Error, Result};

/// Camera capture configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Program producing MJPEG on stdout
    pub program: String,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Capture frame rate
    pub framerate: u32,

    /// Extra arguments appended after the generated ones
    pub extra_args: Vec<String>,

    /// Largest accepted encoded frame in bytes
    pub max_frame_size: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            program: "rpicam-vid".to_string(),
            width: 640,
            height: 480,
            framerate: 24,
            extra_args: Vec::new(),
            max_frame_size: crate::media::jpeg::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl CameraConfig {
    /// Set the camera program
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the capture resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the capture frame rate
    pub fn framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate.max(1);
        self
    }

    /// Append an extra argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Arguments passed to the camera program
    ///
    /// Runs indefinitely (`-t 0`), without preview, encoding MJPEG to stdout.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-t".into(),
            "0".into(),
            "--nopreview".into(),
            "--codec".into(),
            "mjpeg".into(),
            "--width".into(),
            self.width.to_string(),
            "--height".into(),
            self.height.to_string(),
            "--framerate".into(),
            self.framerate.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("-o".into());
        args.push("-".into());
        args
    }
}

/// Running camera process
pub struct Camera {
    child: Child,
}

impl Camera {
    /// Spawn the camera program and take its stdout
    ///
    /// The process is killed when the returned `Camera` is dropped.
    pub fn spawn(config: &CameraConfig) -> Result<(Self, ChildStdout)> {
        let mut child = Command::new(&config.program)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or(Error::SourceEnded)?;

        tracing::info!(
            program = %config.program,
            pid = ?child.id(),
            width = config.width,
            height = config.height,
            framerate = config.framerate,
            "Camera started"
        );

        Ok((Self { child }, stdout))
    }

    /// Stop the camera process
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Camera already exited");
        }
        tracing::info!("Camera stopped");
    }
}
