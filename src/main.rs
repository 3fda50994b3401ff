//! feeder-cam binary
//!
//! ```text
//! feeder-cam [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>              HTTP bind address [default: 0.0.0.0]
//!   --port <PORT>              HTTP port [default: 8000]
//!   --max-connections <N>      Requests in flight, 0 for no limit [default: 0]
//!   --camera-program <PATH>    Camera program [default: rpicam-vid]
//!   --camera-input <PATH>      Read MJPEG from a file or `-` for stdin
//!   --width <PX>               Frame width [default: 640]
//!   --height <PX>              Frame height [default: 480]
//!   --framerate <FPS>          Frame rate [default: 24]
//!   --broker-host <HOST>       MQTT broker host [default: 192.168.0.5]
//!   --broker-port <PORT>       MQTT broker port [default: 1883]
//!   --keepalive <SECS>         MQTT keepalive [default: 60]
//!   --no-broker                Do not connect to the broker
//! ```
//!
//! Every option can also be set through the `FEEDER_*` environment variable
//! shown in `--help`. Log verbosity follows `RUST_LOG`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncRead;
use tracing_subscriber::EnvFilter;

use feeder_cam::command::LoggingActuator;
use feeder_cam::media::{Camera, CameraConfig};
use feeder_cam::mqtt::BrokerConfig;
use feeder_cam::{App, AppConfig, ServerConfig};

type Input = Pin<Box<dyn AsyncRead + Send>>;

/// Live MJPEG camera server with MQTT feed commands
#[derive(Debug, Parser)]
#[command(name = "feeder-cam", version)]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0", env = "FEEDER_BIND")]
    bind: IpAddr,

    /// HTTP port
    #[arg(long, default_value_t = 8000, env = "FEEDER_PORT")]
    port: u16,

    /// Maximum HTTP requests in flight, open streams included (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "FEEDER_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Program that writes MJPEG to stdout
    #[arg(long, default_value = "rpicam-vid", env = "FEEDER_CAMERA_PROGRAM")]
    camera_program: String,

    /// Read MJPEG from this file instead of spawning the camera (`-` = stdin)
    #[arg(long, env = "FEEDER_CAMERA_INPUT")]
    camera_input: Option<PathBuf>,

    #[arg(long, default_value_t = 640, env = "FEEDER_WIDTH")]
    width: u32,

    #[arg(long, default_value_t = 480, env = "FEEDER_HEIGHT")]
    height: u32,

    #[arg(long, default_value_t = 24, env = "FEEDER_FRAMERATE")]
    framerate: u32,

    /// MQTT broker host
    #[arg(long, default_value = "192.168.0.5", env = "FEEDER_BROKER_HOST")]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883, env = "FEEDER_BROKER_PORT")]
    broker_port: u16,

    /// MQTT keepalive interval in seconds
    #[arg(long, default_value_t = 60, env = "FEEDER_KEEPALIVE")]
    keepalive: u64,

    /// Run without the command listener
    #[arg(long, env = "FEEDER_NO_BROKER")]
    no_broker: bool,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        let server = ServerConfig::with_addr(SocketAddr::new(self.bind, self.port))
            .max_connections(self.max_connections)
            .page_size(self.width, self.height);

        let camera = CameraConfig::default()
            .program(&self.camera_program)
            .resolution(self.width, self.height)
            .framerate(self.framerate);

        let broker = BrokerConfig::new(&self.broker_host, self.broker_port)
            .keep_alive(Duration::from_secs(self.keepalive));

        let config = AppConfig::default().server(server).camera(camera).broker(broker);
        if self.no_broker {
            config.without_broker()
        } else {
            config
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feeder_cam=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.app_config();

    let (camera, input): (Option<Camera>, Input) = match cli.camera_input.as_deref() {
        Some(path) if path.as_os_str() == "-" => (None, Box::pin(tokio::io::stdin())),
        Some(path) => match tokio::fs::File::open(path).await {
            Ok(file) => (None, Box::pin(file)),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to open camera input");
                return ExitCode::FAILURE;
            }
        },
        None => match Camera::spawn(&config.camera) {
            Ok((camera, stdout)) => (Some(camera), Box::pin(stdout)),
            Err(e) => {
                tracing::error!(program = %config.camera.program, error = %e, "Failed to start camera");
                return ExitCode::FAILURE;
            }
        },
    };

    let app = App::new(config);
    tracing::info!(
        addr = %app.bind_addr(),
        broker = app.context().config.broker_enabled,
        "Starting feeder-cam"
    );

    let result = app
        .run_until(input, Arc::new(LoggingActuator), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Some(camera) = camera {
        camera.stop().await;
    }

    let stats = app.stats();
    tracing::info!(
        requests = stats.total_requests,
        bytes_sent = stats.total_bytes_sent,
        uptime_secs = stats.uptime.as_secs(),
        "Server stopped"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}
