//! Edge Portal - Raspberry Pi Sensor and Camera Daemon Binary
//!
//! Serves the AHT30 sensor and the camera over HTTP, or takes a single
//! reading or snapshot from the command line.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use edge_portal::{
    capture_snapshot, start_web_server, AppState, CameraConfig, Sensor, SensorConfig, WebConfig,
    DEFAULT_WEB_PORT,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "edge_portal")]
#[command(about = "Raspberry Pi sensor and camera daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Serves an AHT30 sensor and an rpicam MJPEG stream over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, env = "VIDEO_PORT", default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    #[command(flatten)]
    camera: CameraArgs,

    #[command(flatten)]
    sensor: SensorArgs,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Args)]
struct CameraArgs {
    /// Frame width in pixels
    #[arg(long, env = "VIDEO_WIDTH", default_value_t = 640)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, env = "VIDEO_HEIGHT", default_value_t = 480)]
    height: u32,

    /// Stream frame rate
    #[arg(long, env = "VIDEO_FPS", default_value_t = 30)]
    fps: u32,

    /// Streaming producer executable
    #[arg(long, env = "RPICAM_VID", default_value = "rpicam-vid")]
    rpicam_vid: String,

    /// Still producer executable
    #[arg(long, env = "RPICAM_JPEG", default_value = "rpicam-jpeg")]
    rpicam_jpeg: String,

    /// Extra flags for the streaming producer
    #[arg(long, env = "RPICAM_VID_FLAGS", default_value = "", allow_hyphen_values = true)]
    rpicam_vid_flags: String,

    /// Extra flags for the still producer
    #[arg(long, env = "RPICAM_JPEG_FLAGS", default_value = "", allow_hyphen_values = true)]
    rpicam_jpeg_flags: String,
}

#[derive(Args)]
struct SensorArgs {
    /// I2C bus number of the AHT30
    #[arg(long, env = "AHT30_I2C_BUS", default_value_t = 1)]
    i2c_bus: u8,

    /// I2C address of the AHT30 (hex like 0x38 or decimal)
    #[arg(long, env = "AHT30_ADDRESS", default_value = "0x38", value_parser = parse_address)]
    i2c_address: u16,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Take a single sensor reading and exit
    Read,

    /// Capture a single JPEG and exit
    Snapshot(SnapshotArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Static files directory (optional)
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Do not open the sensor or serve /read
    #[arg(long)]
    no_sensor: bool,

    /// Do not serve /snapshot.jpg or /mjpeg
    #[arg(long)]
    no_camera: bool,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output file; stdout when omitted or "-"
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_address(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("{:#x} is not a 7-bit I2C address", address)),
        Err(e) => Err(format!("invalid I2C address '{}': {}", value, e)),
    }
}

impl CameraArgs {
    fn to_config(&self) -> CameraConfig {
        CameraConfig::default()
            .with_resolution(self.width, self.height)
            .with_fps(self.fps)
            .with_video_program(&self.rpicam_vid, &self.rpicam_vid_flags)
            .with_still_program(&self.rpicam_jpeg, &self.rpicam_jpeg_flags)
    }
}

impl SensorArgs {
    fn to_config(&self) -> SensorConfig {
        SensorConfig::new(self.i2c_bus, self.i2c_address)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Read) => read_command(&cli).await,
        Some(Commands::Snapshot(args)) => snapshot_command(&cli, args).await,
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    // stdout stays clean for `snapshot` output.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("Edge Portal - Raspberry Pi Sensor and Camera Daemon");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    print_banner();
    info!("Starting edge portal...");

    let mut state = AppState::new();

    if args.no_sensor {
        info!("Sensor disabled");
    } else {
        let config = cli.sensor.to_config();
        let sensor = Sensor::open(&config).with_context(|| {
            format!(
                "failed to open AHT30 on /dev/i2c-{} at {:#04x}",
                config.bus, config.address
            )
        })?;
        state = state.with_sensor(sensor);
    }

    if args.no_camera {
        info!("Camera disabled");
    } else {
        let camera = cli.camera.to_config();
        info!(
            "Camera: {}x{} @ {}fps via {} / {}",
            camera.width, camera.height, camera.fps, camera.video_program, camera.still_program
        );
        state = state.with_camera(camera);
    }

    let mut web_config = WebConfig::new(&cli.host, cli.port).with_cors(!args.no_cors);
    if let Some(static_dir) = &args.static_dir {
        web_config = web_config.with_static_path(Some(static_dir.clone()));
        info!("Using static files from: {}", static_dir);
    }

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", !args.no_cors);

    start_web_server(web_config, state).await?;
    Ok(())
}

async fn read_command(cli: &Cli) -> anyhow::Result<()> {
    let sensor = Sensor::open(&cli.sensor.to_config()).context("failed to open AHT30")?;

    match sensor.read().await {
        Ok(reading) => {
            print!(
                "Temp: {:.2}°C ({:.2}°F), Humidity: {:.2}%",
                reading.temperature_c,
                reading.temperature_f(),
                reading.humidity_percent
            );
            if reading.busy {
                print!(" (BUSY bit set)");
            }
            println!();
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn snapshot_command(cli: &Cli, args: &SnapshotArgs) -> anyhow::Result<()> {
    let image = capture_snapshot(&cli.camera.to_config())
        .await
        .context("snapshot failed")?;

    match args.output.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            tokio::fs::write(path, &image)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", image.len(), path.display());
        }
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&image)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
