//! HTTP server listener
//!
//! Binds the socket itself so address reuse can be set, then hands it to
//! `axum::serve`, which runs each connection in its own task. A slow stream
//! client never stalls new connections or other streams.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::serve::ListenerExt;
use axum::Router;
use tokio::net::{TcpListener, TcpSocket};

use crate::error::Result;
use crate::media::FrameBuffer;
use crate::stats::ServerStats;

use super::config::ServerConfig;
use super::routes::{self, HttpState};

const LISTEN_BACKLOG: u32 = 1024;

/// MJPEG HTTP server
pub struct HttpServer {
    state: HttpState,
    bind_addr: SocketAddr,
    tcp_nodelay: bool,
}

impl HttpServer {
    /// Create a new server streaming frames from `frames`
    pub fn new(config: ServerConfig, frames: Arc<FrameBuffer>) -> Self {
        Self {
            bind_addr: config.bind_addr,
            tcp_nodelay: config.tcp_nodelay,
            state: HttpState::new(config, frames),
        }
    }

    /// Bind the configured address with address reuse enabled
    ///
    /// Allows immediate re-binding after a restart while old connections
    /// linger in TIME_WAIT.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.bind_addr;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");
        Ok(listener)
    }

    /// The route table, sharing this server's frames and counters
    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Serve requests on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let nodelay = self.tcp_nodelay;
        let listener = listener.tap_io(move |socket| {
            if let Err(e) = socket.set_nodelay(nodelay) {
                tracing::warn!(error = %e, "Failed to configure socket");
            }
        });

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Configured listen address
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Snapshot of server-wide counters
    pub fn stats(&self) -> ServerStats {
        self.state.counters().snapshot()
    }
}
