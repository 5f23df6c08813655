#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use udfps_illumination::config::{FileSettings, Settings};
use udfps_illumination::controller::{Collaborators, DisplayConfigurationController};
use udfps_illumination::hal::{HalServer, HardwareServiceProxy, SocketHal, StubHandler};
use udfps_illumination::scheduler::WorkerQueue;
use udfps_illumination::surface::{SoftwareSurface, SurfaceLifecycleManager};
use udfps_illumination::touch_mode::TouchModeSequencer;
use udfps_illumination::types::{Rect, SharedGeometry};
use udfps_illumination::view::LoggingViewController;

/// Panel the software surface stands in for
const PANEL: Rect = Rect::new(0, 0, 1080, 2400);
const SENSOR: Rect = Rect::new(453, 1910, 174, 174);

/// How long to wait for the illumination callback before giving up
const CONFIGURE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "udfps-illumination")]
#[command(about = "Under-display fingerprint illumination sequencer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one illumination activation against the vendor bridge
    Run {
        /// Skip the illumination surface (no draw, completion right after the boost)
        #[arg(long)]
        no_surface: bool,

        /// Write the illuminated frame to a PNG file
        #[arg(long, value_name = "PATH")]
        dump_frame: Option<PathBuf>,

        /// Keep illumination on for this long before unconfiguring
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        hold_ms: u64,
    },

    /// Serve a logging vendor bridge that accepts every command
    HalStub {
        /// Socket to listen on (defaults to the configured bridge socket)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Inspect or reset the config file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings as JSON
    Show,
    /// Print the config file location
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

fn main() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { no_surface, dump_frame, hold_ms } => {
            run_activation(no_surface, dump_frame, Duration::from_millis(hold_ms))
        }
        Commands::HalStub { socket } => run_hal_stub(socket),
        Commands::Config(command) => run_config(command),
    }
}

fn run_activation(no_surface: bool, dump_frame: Option<PathBuf>, hold: Duration) -> Result<()> {
    let settings = Settings::load()?;
    let socket = settings.hal_socket_path()?;
    info!(socket = %socket.display(), policy = ?settings.stale_task_policy, "Starting activation");

    let source = Arc::new(FileSettings::new(Settings::config_path()));
    let proxy = HardwareServiceProxy::new(Arc::new(SocketHal::new(socket)), source.clone());
    let queue = Arc::new(
        WorkerQueue::spawn("touch-mode").context("Failed to spawn touch-mode worker")?,
    );
    let touch = TouchModeSequencer::new(proxy.clone(), queue, settings.stale_task_policy);

    let geometry = SharedGeometry::default();
    let frame = Arc::new(SoftwareSurface::new(PANEL.width, PANEL.height));
    let surface = (!no_surface).then(|| {
        Arc::new(SurfaceLifecycleManager::new(frame.clone(), geometry.clone(), source.clone()))
    });

    let controller = DisplayConfigurationController::new(
        proxy,
        touch,
        geometry,
        Collaborators {
            view: Arc::new(LoggingViewController),
            display_mode: None,
            surface: surface.clone(),
        },
    );
    controller.on_layout(SENSOR, PANEL);

    let (done_tx, done_rx) = mpsc::channel();
    controller.configure(move || {
        let _ = done_tx.send(());
    });
    if let Some(surface) = &surface {
        surface.on_surface_created();
    }

    match done_rx.recv_timeout(CONFIGURE_TIMEOUT) {
        Ok(()) => info!(state = ?controller.state(), "Illumination configured"),
        Err(_) => warn!(timeout = ?CONFIGURE_TIMEOUT, "Illumination never completed"),
    }

    if let Some(path) = &dump_frame {
        if no_surface {
            warn!("--dump-frame ignored with --no-surface");
        } else {
            frame.write_png(path)?;
            info!(path = %path.display(), "Wrote illuminated frame");
        }
    }

    thread::sleep(hold);
    controller.unconfigure();
    if let Some(surface) = &surface {
        surface.on_surface_destroyed();
    }

    let counts = frame.counts();
    if counts.acquired != counts.released {
        error!(acquired = counts.acquired, released = counts.released, "Frame lock imbalance");
    }
    info!(frames = counts.released, "Activation finished");
    Ok(())
}

fn run_hal_stub(socket: Option<PathBuf>) -> Result<()> {
    let socket = match socket {
        Some(path) => path,
        None => Settings::load()?.hal_socket_path()?,
    };
    let server = HalServer::bind_to(socket)?;
    info!(socket = %server.path().display(), "Vendor bridge stub listening");
    server.serve(&StubHandler)
}

fn run_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load()?;
            let json = serde_json::to_string_pretty(&settings)
                .context("Failed to serialize config to JSON")?;
            println!("{json}");
        }
        ConfigCommands::Path => println!("{}", Settings::config_path().display()),
        ConfigCommands::Reset => {
            Settings::default().save()?;
            info!(path = %Settings::config_path().display(), "Config reset to defaults");
        }
    }
    Ok(())
}
