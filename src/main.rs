//! stagekit command-line tool
//!
//! Drives a Grbl or TinyG stage from the shell, or a simulated controller
//! with `--simulate`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stagekit::{
    init_logging_with, list_ports, Axis, Config, ControllerType, DetectionStatus,
    SimulatedController, StageDevice, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// Command line arguments
#[derive(Parser)]
#[command(name = "stagekit")]
#[command(about = "Drive a Grbl/TinyG XY(Z) stage over a serial line")]
#[command(version)]
struct Args {
    /// Serial port (overrides the configuration file)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Talk to an in-process simulated controller instead of a serial port
    #[arg(long, value_enum, global = true)]
    simulate: Option<SimulatedFirmware>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SimulatedFirmware {
    Grbl,
    Tinyg,
}

impl From<SimulatedFirmware> for ControllerType {
    fn from(value: SimulatedFirmware) -> Self {
        match value {
            SimulatedFirmware::Grbl => ControllerType::Grbl,
            SimulatedFirmware::Tinyg => ControllerType::TinyG,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports that look like motion controllers
    Ports,
    /// Check whether a controller answers on the port
    Detect,
    /// Print firmware, position and machine state
    Status,
    /// Move the stage, in steps
    Move {
        /// X target (or offset with --relative)
        x: i64,
        /// Y target (or offset with --relative)
        y: i64,
        /// Optional Z target (or offset)
        #[arg(short, long)]
        z: Option<i64>,
        /// Interpret coordinates as offsets
        #[arg(short, long)]
        relative: bool,
        /// Wait until the stage reports idle
        #[arg(short, long)]
        wait: bool,
    },
    /// Run the homing cycle
    Home,
    /// Print or change controller parameters
    Params {
        /// Store `KEY=VALUE` before printing
        #[arg(long, value_name = "KEY=VALUE")]
        set: Option<String>,
    },
    /// Send a raw command and print the reply
    Raw {
        /// Command line, e.g. "$I"
        command: String,
    },
    /// Print the effective configuration, or save it
    Config {
        /// Write the configuration to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => match Config::default_path() {
            Ok(path) if path.exists() => Config::load_from_file(&path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            _ => Config::default(),
        },
    };

    if let Some(port) = &args.port {
        config.connection.port = port.clone();
    }
    if args.simulate.is_some() {
        if !config.connection.has_port() {
            config.connection.port = "simulator".to_string();
        }
        config.connection.open_settle_ms = 0;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_device(args: &Args, config: Config) -> StageDevice {
    match args.simulate {
        Some(firmware) => {
            let simulator = SimulatedController::new(firmware.into());
            info!("Using simulated {} controller", ControllerType::from(firmware));
            StageDevice::with_opener(config, simulator.handle().opener())
        }
        None => StageDevice::new(config),
    }
}

fn ready_device(args: &Args, config: Config) -> Result<StageDevice> {
    let mut device = open_device(args, config);
    device
        .initialize()
        .with_context(|| format!("Failed to initialize stage on {}", device.config().connection.port))?;
    Ok(device)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn wait_idle(device: &StageDevice, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    while device.is_busy() {
        if started.elapsed() > timeout {
            bail!("Stage still busy after {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

fn run(args: &Args, config: Config) -> Result<()> {
    match &args.command {
        Commands::Ports => {
            let ports = list_ports().context("Failed to enumerate serial ports")?;
            if ports.is_empty() {
                println!("No controller ports found");
            }
            for port in ports {
                match port.manufacturer {
                    Some(manufacturer) => {
                        println!("{}\t{} ({})", port.port_name, port.description, manufacturer)
                    }
                    None => println!("{}\t{}", port.port_name, port.description),
                }
            }
        }
        Commands::Detect => {
            let device = open_device(args, config);
            let status = device.detect_device();
            println!("{:?}", status);
            if status != DetectionStatus::CanCommunicate {
                bail!("No controller on {}", device.config().connection.port);
            }
        }
        Commands::Status => {
            let device = ready_device(args, config)?;
            let snapshot = device.query_status().context("Status query failed")?;
            if args.json {
                print_json(&serde_json::json!({
                    "identity": device.identity(),
                    "status": snapshot,
                    "steps": device.get_position_steps()?,
                }))?;
            } else {
                if let Some(identity) = device.identity() {
                    println!("Firmware: {} {}", identity.controller, identity.version);
                }
                println!("State:    {}", snapshot.state);
                println!("MPos:     {}", snapshot.machine_position);
                println!("WPos:     {}", snapshot.work_position);
                let (x, y) = device.get_position_steps()?;
                println!("Steps:    X{} Y{} Z{}", x, y, device.get_z_position_steps()?);
            }
        }
        Commands::Move {
            x,
            y,
            z,
            relative,
            wait,
        } => {
            let device = ready_device(args, config)?;
            if *relative {
                device.move_relative_steps(*x, *y)?;
                if let Some(dz) = z {
                    device.move_z_relative_steps(*dz)?;
                }
            } else {
                device.move_absolute_steps(*x, *y)?;
                if let Some(z) = z {
                    device.set_z_position_steps(*z)?;
                }
            }
            if *wait {
                let timeout = Duration::from_millis(device.config().timeouts.extended_ms);
                wait_idle(&device, timeout)?;
                let (x, y) = device.get_position_steps()?;
                println!("At X{} Y{}", x, y);
            }
        }
        Commands::Home => {
            let device = ready_device(args, config)?;
            device.home().context("Homing failed")?;
            println!("Homed");
        }
        Commands::Params { set } => {
            let mut device = ready_device(args, config)?;
            if let Some(assignment) = set {
                let Some((key, value)) = assignment.split_once('=') else {
                    bail!("Expected KEY=VALUE, got {:?}", assignment);
                };
                device
                    .set_parameter(key.trim(), value.trim())
                    .with_context(|| format!("Failed to set {}", key))?;
            }
            let parameters = device.get_parameters()?;
            if args.json {
                print_json(&parameters)?;
            } else {
                for parameter in parameters {
                    match parameter.description {
                        Some(description) => {
                            println!("${}={}\t({})", parameter.key, parameter.value, description)
                        }
                        None => println!("${}={}", parameter.key, parameter.value),
                    }
                }
                for axis in Axis::ALL {
                    if let Ok(limits) = device.get_step_limits(axis) {
                        println!("{} limits: {}..{} steps", axis, limits.min, limits.max);
                    }
                }
            }
        }
        Commands::Raw { command } => {
            let device = ready_device(args, config)?;
            let reply = device.execute_command(command)?;
            println!("{}", reply);
        }
        Commands::Config { save } => match save {
            Some(path) => {
                config
                    .save_to_file(path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
                println!("Saved {}", path.display());
            }
            None => print_json(&config)?,
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    init_logging_with(level)?;
    info!("stagekit {} (built {})", VERSION, BUILD_DATE);

    let config = load_config(&args)?;

    // The status poller runs on tokio; keep a runtime entered for it.
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let _guard = runtime.enter();

    run(&args, config)
}
