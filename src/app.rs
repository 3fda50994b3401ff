//! Application wiring
//!
//! Builds the shared [`FrameBuffer`] and the HTTP server once, then runs the
//! frame source, the command listener and the server side by side:
//!
//! ```text
//! FrameSource task ──publish──► FrameBuffer ◄──wait_for_next── stream clients
//! CommandListener task (independent, optional, DISCONNECTs on shutdown)
//! HttpServer (axum, one task per connection)
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::command::{Actuator, CommandListener};
use crate::error::{Error, Result};
use crate::media::{CameraConfig, FrameBuffer, FrameSource};
use crate::mqtt::BrokerConfig;
use crate::server::{HttpServer, ServerConfig};
use crate::stats::ServerStats;

/// How long the command listener gets to send DISCONNECT
const COMMAND_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the whole process
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub broker: BrokerConfig,
    /// Run the command listener
    pub broker_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            camera: CameraConfig::default(),
            broker: BrokerConfig::default(),
            broker_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self.broker_enabled = true;
        self
    }

    /// Disable the command listener
    pub fn without_broker(mut self) -> Self {
        self.broker_enabled = false;
        self
    }
}

/// State shared by every component, built once at startup
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub frames: Arc<FrameBuffer>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            frames: Arc::new(FrameBuffer::new()),
        }
    }
}

/// The camera server process
pub struct App {
    ctx: AppContext,
    server: HttpServer,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let ctx = AppContext::new(config);
        let server = HttpServer::new(ctx.config.server.clone(), Arc::clone(&ctx.frames));
        Self { ctx, server }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// The shared frame buffer
    pub fn frames(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.ctx.frames)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.server.bind_addr()
    }

    /// HTTP server statistics
    pub fn stats(&self) -> ServerStats {
        self.server.stats()
    }

    /// Bind the HTTP listener
    pub fn bind(&self) -> Result<TcpListener> {
        self.server.bind()
    }

    /// Bind and run until `shutdown` resolves or the frame source fails
    pub async fn run_until<R, A, F>(&self, reader: R, actuator: Arc<A>, shutdown: F) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        A: Actuator,
        F: Future<Output = ()>,
    {
        let listener = self.bind()?;
        self.serve_until(listener, reader, actuator, shutdown).await
    }

    /// Run on an already bound listener
    ///
    /// Returns `Ok` when `shutdown` resolves and the frame source's error
    /// when it stops. Either way the frame buffer is closed so streaming
    /// clients are released, and the command listener disconnects from
    /// the broker.
    pub async fn serve_until<R, A, F>(
        &self,
        listener: TcpListener,
        reader: R,
        actuator: Arc<A>,
        shutdown: F,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        A: Actuator,
        F: Future<Output = ()>,
    {
        let mut source = FrameSource::new(reader, self.frames())
            .max_frame_size(self.ctx.config.camera.max_frame_size);
        let mut source_task = tokio::spawn(async move { source.run().await });

        let commands = if self.ctx.config.broker_enabled {
            let commands = CommandListener::new(self.ctx.config.broker.clone(), actuator);
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(async move {
                commands
                    .run_until(async {
                        let _ = stopped.await;
                    })
                    .await
            });
            Some((stop, task))
        } else {
            tracing::info!("Command listener disabled");
            None
        };

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutting down");
                Ok(())
            }
            result = self.server.serve(listener) => result,
            joined = &mut source_task => {
                let err = match joined {
                    Ok(Ok(())) => Error::SourceEnded,
                    Ok(Err(e)) => e,
                    Err(e) => Error::Io(io::Error::new(io::ErrorKind::Other, e)),
                };
                tracing::error!(error = %err, "Frame source failed");
                Err(err)
            }
        };

        self.ctx.frames.close();
        source_task.abort();
        if let Some((stop, mut task)) = commands {
            let _ = stop.send(());
            if tokio::time::timeout(COMMAND_STOP_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("Command listener did not stop in time");
                task.abort();
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::command::LoggingActuator;
    use crate::mqtt::packet::SubAck;
    use crate::mqtt::Packet;

    use super::*;

    fn local_config() -> AppConfig {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        AppConfig::default()
            .server(ServerConfig::with_addr(addr))
            .without_broker()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.broker_enabled);
        assert_eq!(config.server.bind_addr.port(), 8000);
        assert!(!local_config().broker_enabled);
    }

    #[tokio::test]
    async fn test_source_end_is_fatal() {
        let app = App::new(local_config());
        let frames = app.frames();
        let reader = tokio_test::io::Builder::new()
            .read(&[0xFF, 0xD8, 1, 2, 0xFF, 0xD8, 3, 4])
            .build();

        let result = app
            .run_until(reader, Arc::new(LoggingActuator), std::future::pending())
            .await;

        assert!(matches!(result, Err(Error::SourceEnded)));
        assert!(frames.is_closed());
        assert_eq!(frames.sequence(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_buffer() {
        let app = App::new(local_config());
        let frames = app.frames();
        let (mut camera, reader) = tokio::io::duplex(1024);

        let waiter = {
            let frames = Arc::clone(&frames);
            tokio::spawn(async move { frames.wait_for_next(0).await })
        };

        let shutdown = async {
            camera.write_all(&[0xFF, 0xD8, 9, 9]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        };

        let result = app
            .run_until(reader, Arc::new(LoggingActuator), shutdown)
            .await;
        assert!(result.is_ok());
        assert!(frames.is_closed());

        let waited = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(waited, Err(Error::BufferClosed)));
    }

    async fn read_packet(
        socket: &mut tokio::net::TcpStream,
        buf: &mut BytesMut,
    ) -> Option<Packet> {
        loop {
            if let Some(packet) = Packet::decode(buf).unwrap() {
                return Some(packet);
            }
            if socket.read_buf(buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    async fn write_packet(socket: &mut tokio::net::TcpStream, packet: Packet) {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        socket.write_all(&buf).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_from_broker() {
        let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = broker.local_addr().unwrap().port();
        let config = local_config().broker(BrokerConfig::new("127.0.0.1", port));
        let app = App::new(config);
        let (_camera, reader) = tokio::io::duplex(1024);
        let (stop, stopped) = oneshot::channel::<()>();

        let fake_broker = tokio::spawn(async move {
            let (mut socket, _) = broker.accept().await.unwrap();
            let mut buf = BytesMut::new();

            let connect = read_packet(&mut socket, &mut buf).await;
            assert!(matches!(connect, Some(Packet::Connect(_))));
            let connack = Packet::ConnAck {
                session_present: false,
                return_code: 0,
            };
            write_packet(&mut socket, connack).await;

            let subscribe = match read_packet(&mut socket, &mut buf).await {
                Some(Packet::Subscribe(subscribe)) => subscribe,
                other => panic!("expected SUBSCRIBE, got {:?}", other),
            };
            let suback = SubAck {
                packet_id: subscribe.packet_id,
                return_codes: vec![0; subscribe.topics.len()],
            };
            write_packet(&mut socket, Packet::SubAck(suback)).await;
            let _ = stop.send(());

            read_packet(&mut socket, &mut buf).await
        });

        let result = app
            .run_until(reader, Arc::new(LoggingActuator), async {
                let _ = stopped.await;
            })
            .await;
        assert!(result.is_ok());

        let last = tokio::time::timeout(Duration::from_secs(5), fake_broker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last, Some(Packet::Disconnect));
    }
}
