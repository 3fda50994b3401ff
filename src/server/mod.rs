//! HTTP front end
//!
//! | Method/Path        | Response                                   |
//! |--------------------|--------------------------------------------|
//! | `GET /`            | 301 to `/index.html`                       |
//! | `GET /index.html`  | 200, page embedding the stream             |
//! | `GET /stream.mjpg` | 200, `multipart/x-mixed-replace` stream    |
//! | other path         | 404                                        |
//! | other method       | 501                                        |
//! | over the limit     | 503                                        |

pub mod config;
pub mod listener;
pub mod page;
pub mod routes;

pub use config::ServerConfig;
pub use listener::HttpServer;
pub use routes::{router, HttpState, INDEX_PATH, STREAM_PATH};
