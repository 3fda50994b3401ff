//! feeder-cam: live MJPEG camera server with remote feed commands
//!
//! A single process that:
//! - reads the camera's MJPEG byte stream and keeps only the newest frame
//! - serves a viewer page and a `multipart/x-mixed-replace` stream to any
//!   number of browsers over HTTP
//! - listens on an MQTT broker for `hi` / `yes!` commands that drive the
//!   feeder hardware
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feeder_cam::command::LoggingActuator;
//! use feeder_cam::media::Camera;
//! use feeder_cam::{App, AppConfig};
//!
//! #[tokio::main]
//! async fn main() -> feeder_cam::Result<()> {
//!     let config = AppConfig::default();
//!     let (_camera, stdout) = Camera::spawn(&config.camera)?;
//!
//!     let app = App::new(config);
//!     app.run_until(stdout, Arc::new(LoggingActuator), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod app;
pub mod command;
pub mod error;
pub mod media;
pub mod mqtt;
pub mod server;
pub mod session;
pub mod stats;

pub use app::{App, AppConfig, AppContext};
pub use error::{Error, Result};
pub use media::{Frame, FrameBuffer};
pub use server::{HttpServer, ServerConfig};
