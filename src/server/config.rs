//! HTTP server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Listener, stream and page settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum requests in flight, open streams included (0 = unlimited)
    pub max_connections: usize,

    /// Set `TCP_NODELAY` on accepted sockets
    pub tcp_nodelay: bool,

    /// End a stream if no new frame arrives within this time (None = wait forever)
    pub frame_timeout: Option<Duration>,

    /// Width of the `<img>` element on the index page
    pub page_width: u32,

    /// Height of the `<img>` element on the index page
    pub page_height: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Frames should leave as soon as they are written
            frame_timeout: None,
            page_width: 640,
            page_height: 480,
        }
    }
}

impl ServerConfig {
    /// Defaults listening on `addr`
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Listen on `addr`
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Limit requests in flight, 0 for no limit
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the idle frame timeout for stream sessions
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = Some(timeout);
        self
    }

    /// Set the displayed image size on the index page
    pub fn page_size(mut self, width: u32, height: u32) -> Self {
        self.page_width = width;
        self.page_height = height;
        self
    }
}
