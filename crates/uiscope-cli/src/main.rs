//! Command-line inspector for Android device UIs.
//!
//! Drives uiscope-core directly against `adb`; no server is involved.
//!
//! # Usage
//!
//! ```bash
//! # List connected devices
//! uiscope devices
//!
//! # Model, Android version and screen size
//! uiscope -s emulator-5554 info
//!
//! # Capture a screenshot into public/screenshots
//! uiscope screenshot
//!
//! # Dump the normalized UI hierarchy as JSON
//! uiscope --format json dump
//!
//! # Which element is at (540, 1200)? Tap it too.
//! uiscope locate 540 1200 --tap
//!
//! # Every element under (540, 1200), outermost first
//! uiscope locate 540 1200 --all
//!
//! # Tap at coordinates
//! uiscope tap 540 1200
//!
//! # Show the effective configuration
//! uiscope config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uiscope_core::bridge::{AdbRunner, BridgeError};
use uiscope_core::config::InspectorConfig;
use uiscope_core::device::{list_devices, Device, DeviceError};
use uiscope_core::element::UiNode;
use uiscope_core::locate::elements_at;
use uiscope_core::screenshot::CaptureError;

/// Inspect and drive the UI of an Android device over adb.
#[derive(Parser)]
#[command(name = "uiscope")]
#[command(about = "Inspect and drive the UI of an Android device over adb")]
#[command(version)]
struct Cli {
    /// Serial of the device to address
    #[arg(short, long, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Path to the adb executable
    #[arg(long, env = "UISCOPE_ADB")]
    adb: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List connected devices
    Devices,

    /// Show model, Android version and screen size
    Info,

    /// Capture a screenshot to a PNG file
    Screenshot {
        /// Directory to write into (overrides the configured one)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Dump the normalized UI hierarchy
    Dump,

    /// Find the smallest element containing a point
    Locate {
        /// X coordinate
        x: i32,
        /// Y coordinate
        y: i32,
        /// Also tap at the point
        #[arg(long)]
        tap: bool,
        /// List every element containing the point, outermost first
        #[arg(long)]
        all: bool,
    },

    /// Tap at screen coordinates
    Tap {
        /// X coordinate
        x: i32,
        /// Y coordinate
        y: i32,
    },

    /// Print the effective configuration
    Config {
        /// Persist the effective configuration to ~/.uiscope/config.json
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    BridgeUnavailable(String),
    Failed(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failed(_) => ExitCode::from(1),
            CliError::BridgeUnavailable(_) => ExitCode::from(2),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::BridgeUnavailable(msg) => write!(f, "adb unavailable: {}", msg),
            CliError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        if e.is_not_installed() {
            CliError::BridgeUnavailable(e.to_string())
        } else {
            CliError::Failed(e.to_string())
        }
    }
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Bridge(e) => e.into(),
            other => CliError::Failed(other.to_string()),
        }
    }
}

impl From<CaptureError> for CliError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Bridge(e) => e.into(),
            other => CliError::Failed(other.to_string()),
        }
    }
}

/// Loads the stored config and applies command-line overrides.
fn effective_config(cli: &Cli) -> InspectorConfig {
    let mut config = InspectorConfig::load();
    if let Some(serial) = &cli.serial {
        config.device_serial = Some(serial.clone());
    }
    if let Some(adb) = &cli.adb {
        config.adb_path = adb.clone();
    }
    if let Command::Screenshot { dir: Some(dir) } = &cli.command {
        config.screenshot_dir = dir.clone();
    }
    config
}

fn json_error(e: serde_json::Error) -> CliError {
    CliError::Failed(format!("Failed to serialize output: {}", e))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = effective_config(&cli);
    let device = || Device::from_config(&config);

    match cli.command {
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config).map_err(json_error)?);
            if save {
                config
                    .save()
                    .map_err(|e| CliError::Failed(format!("Failed to save config: {}", e)))?;
                eprintln!("Saved configuration");
            }
        }
        Command::Devices => {
            let runner = AdbRunner::with_program(&config.adb_path, None);
            let devices = list_devices(&runner, config.command_timeout()).await?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&devices).map_err(json_error)?);
            } else if devices.is_empty() {
                eprintln!("No devices found");
            } else {
                for device in &devices {
                    println!("{}\t{}", device.id, device.status);
                }
            }
        }
        Command::Info => {
            let device = device();
            let info = device.info().await?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&info).map_err(json_error)?);
            } else {
                println!("Device: {}", device.id());
                println!("Model: {}", info.model);
                println!("Android: {}", info.android_version);
                match (info.width, info.height) {
                    (Some(w), Some(h)) => println!("Screen: {}x{}", w, h),
                    _ => println!("Screen: {}", info.screen_size),
                }
            }
        }
        Command::Screenshot { .. } => {
            let device = device();
            let shot = device.capture_screenshot().await?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&shot).map_err(json_error)?);
            } else {
                println!("{}", shot.path.display());
                eprintln!("Served at {}", shot.url);
            }
        }
        Command::Dump => {
            let hierarchy = device().fetch_hierarchy().await;
            if let Some(warning) = hierarchy.warning() {
                eprintln!("Warning: {}", warning);
            }
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&hierarchy).map_err(json_error)?);
            } else {
                print_tree(hierarchy.tree(), 0);
            }
        }
        Command::Locate { x, y, tap, all } => {
            let device = device();
            let hierarchy = device.fetch_hierarchy().await;
            if let Some(warning) = hierarchy.warning() {
                eprintln!("Warning: {}", warning);
            }
            let tree = hierarchy.tree();
            let node = device
                .find_element_at(tree, x, y)
                .ok_or_else(|| CliError::Failed(format!("No element at ({}, {})", x, y)))?;
            match (cli.format, all) {
                (OutputFormat::Json, false) => {
                    println!("{}", serde_json::to_string_pretty(node).map_err(json_error)?)
                }
                (OutputFormat::Json, true) => {
                    let ids: Vec<u64> = elements_at(tree, x, y).iter().map(|n| n.id).collect();
                    let report = serde_json::json!({ "element": node, "containing": ids });
                    println!("{}", serde_json::to_string_pretty(&report).map_err(json_error)?);
                }
                (OutputFormat::Text, false) => println!("{}", describe(node)),
                (OutputFormat::Text, true) => {
                    for line in containing_lines(tree, node, x, y) {
                        println!("{}", line);
                    }
                }
            }
            if tap && !device.tap(x, y).await {
                return Err(CliError::Failed(format!("Tap at ({}, {}) failed", x, y)));
            }
        }
        Command::Tap { x, y } => {
            if !device().tap(x, y).await {
                return Err(CliError::Failed(format!("Tap at ({}, {}) failed", x, y)));
            }
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "success": true, "x": x, "y": y }));
            }
        }
    }

    Ok(())
}

/// One-line summary: id, selector, bounds and a clickable marker.
fn describe(node: &UiNode) -> String {
    let clickable = if node.clickable { " [clickable]" } else { "" };
    format!("#{} {} {}{}", node.id, node.selector, node.bounds, clickable)
}

/// Every element containing `(x, y)` in pre-order, with `hit` marked.
fn containing_lines(tree: &UiNode, hit: &UiNode, x: i32, y: i32) -> Vec<String> {
    elements_at(tree, x, y)
        .into_iter()
        .map(|node| {
            let marker = if node.id == hit.id { "* " } else { "  " };
            format!("{}{}", marker, describe(node))
        })
        .collect()
}

fn print_tree(node: &UiNode, depth: usize) {
    println!("{}{}", "  ".repeat(depth), describe(node));
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
