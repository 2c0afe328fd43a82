//! Weighlink CLI - Command-line interface
//!
//! Streams readings from a scale, sends tare/zero/calibration commands and
//! decodes captured frames offline.

use anyhow::Context;
use bytes::Bytes;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use weighlink_core::cli::{
    effective_level, init_logging, print_exit_codes, CliResult, ExitCodes, OutputFormat,
    ReadingFormatter,
};
use weighlink_core::config::{self, AppConfig};
use weighlink_core::core::command::validate_reference_weight;
use weighlink_core::core::driver::DriverOutcome;
use weighlink_core::core::protocol;
use weighlink_core::core::transport::list_ports;
use weighlink_core::{
    decode, decode_auto, detect, ByteTransport, ConnectionSettings, DriverOptions, FlowControl,
    FrameKind, MassUnit, MemoryTransport, Parity, ProtocolSelector, SerialTransport, Session, SessionDriver,
    SessionError, SessionEvent, SessionHandle, StopBits, TransportError,
};

/// Replay files are fed in chunks this size, so frames straddle reads
const REPLAY_CHUNK: usize = 64;

type EventSession = Session<broadcast::Sender<SessionEvent>>;

/// Weighlink CLI
#[derive(Parser, Debug)]
#[command(
    name = "weighlink",
    author = "Weighlink Team",
    version,
    about = "Weighing-scale protocol decoder and controller",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// More log output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Config file instead of the platform default
    #[arg(short, long, env = "WEIGHLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Serial link options; unset values come from the config file
#[derive(Args, Debug, Clone)]
struct LinkArgs {
    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    data_bits: Option<u8>,

    /// Parity (none, even, odd, space, mark)
    #[arg(long)]
    parity: Option<Parity>,

    /// Stop bits (1, 1.5, 2)
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// Flow control (none, hardware, software)
    #[arg(long)]
    flow: Option<FlowControl>,

    /// Protocol name or alias, or `auto`
    #[arg(short = 'P', long)]
    protocol: Option<ProtocolSelector>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// List supported protocols
    Protocols,

    /// Identify the protocol of sample lines (reads stdin when none given)
    Detect {
        /// Sample lines
        lines: Vec<String>,
    },

    /// Decode one captured frame
    Decode {
        /// Protocol name or alias, or `auto`
        #[arg(short = 'P', long, default_value = "auto")]
        protocol: ProtocolSelector,

        /// Data is hex (spaces allowed) instead of text
        #[arg(long)]
        hex: bool,

        /// Frame data
        data: String,
    },

    /// Stream readings until interrupted
    Monitor {
        #[command(flatten)]
        link: LinkArgs,

        /// Stop when this weight is reached (display unit)
        #[arg(short, long)]
        target: Option<f64>,

        /// Target tolerance (display unit)
        #[arg(long, requires = "target")]
        tolerance: Option<f64>,

        /// Stop after this many readings
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Display unit
        #[arg(short, long)]
        unit: Option<MassUnit>,

        /// Decimal places
        #[arg(long)]
        decimals: Option<usize>,

        /// Read a raw byte capture instead of a port
        #[arg(long, conflicts_with = "port")]
        replay: Option<PathBuf>,

        /// Send the weight request probe after connecting
        #[arg(long)]
        probe: bool,
    },

    /// Send the tare command
    Tare {
        #[command(flatten)]
        link: LinkArgs,

        /// Seconds to wait for auto-detection
        #[arg(long, default_value = "5")]
        wait: u64,
    },

    /// Send the zero command
    Zero {
        #[command(flatten)]
        link: LinkArgs,

        /// Seconds to wait for auto-detection
        #[arg(long, default_value = "5")]
        wait: u64,
    },

    /// Calibrate against a reference weight
    Calibrate {
        #[command(flatten)]
        link: LinkArgs,

        /// Seconds to wait for auto-detection
        #[arg(long, default_value = "5")]
        wait: u64,

        /// Reference weight in kilograms
        weight: f64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[derive(Debug, Clone, Copy)]
enum DeviceCommand {
    Tare,
    Zero,
    Calibrate(f64),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => {
            let level = effective_level(&config.logging.level, cli.verbose, cli.quiet);
            match init_logging(&level, cli.log_json || config.logging.json) {
                Ok(()) => run(&cli, config).await,
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };

    let outcome = result.unwrap_or_else(|e| CliResult::from_error(&e));
    match &outcome {
        CliResult::Error(_, message) => eprintln!("error: {message}"),
        CliResult::Success(Some(message)) if !cli.quiet => eprintln!("{message}"),
        CliResult::Success(_) => {}
    }
    outcome.to_exit_code()
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) if path.exists() => AppConfig::load_from(path)?,
        Some(_) => AppConfig::default(),
        None => AppConfig::load()?,
    };
    Ok(config)
}

async fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<CliResult> {
    debug!(version = weighlink_core::VERSION, "starting");
    match &cli.command {
        Commands::ListPorts => show_ports(cli),
        Commands::Protocols => show_protocols(cli),
        Commands::Detect { lines } => detect_lines(cli, lines),
        Commands::Decode {
            protocol,
            hex,
            data,
        } => decode_frame(cli, &config, *protocol, *hex, data),
        Commands::Monitor {
            link,
            target,
            tolerance,
            count,
            timeout,
            unit,
            decimals,
            replay,
            probe,
        } => {
            let unit = unit.unwrap_or(config.display.unit);
            let plan = MonitorPlan {
                formatter: ReadingFormatter::new(
                    cli.format,
                    unit,
                    decimals.unwrap_or(config.display.decimals),
                ),
                count: *count,
                stop_on_target: target.is_some(),
                timeout: timeout.map(Duration::from_secs),
                replay: replay.is_some(),
            };
            let target = target.map(|t| {
                let tolerance = tolerance.map_or(config.target.tolerance_kg, |t| unit.to_kg(t));
                (unit.to_kg(t), tolerance)
            });
            monitor(&config, link, target, *probe, replay.as_deref(), &plan).await
        }
        Commands::Tare { link, wait } => {
            device_command(&config, link, *wait, DeviceCommand::Tare).await
        }
        Commands::Zero { link, wait } => {
            device_command(&config, link, *wait, DeviceCommand::Zero).await
        }
        Commands::Calibrate { link, wait, weight } => {
            validate_reference_weight(*weight)?;
            device_command(&config, link, *wait, DeviceCommand::Calibrate(*weight)).await
        }
        Commands::Config { action } => handle_config(cli, &config, action),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn show_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            eprintln!("No serial ports found.");
        }
        return Ok(CliResult::success());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Csv => {
            println!("name,type");
            for port in &ports {
                println!("{},{:?}", port.port_name, port.port_type);
            }
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }

    Ok(CliResult::success())
}

fn show_protocols(cli: &Cli) -> anyhow::Result<CliResult> {
    let protocols = protocol::all();
    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = protocols
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name(),
                        "aliases": p.aliases(),
                        "kind": p.kind(),
                        "auto_detect": p.is_detectable(),
                        "sample": p.sample(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Csv => {
            println!("name,kind,auto_detect,sample");
            for p in protocols {
                println!("{},{:?},{},\"{}\"", p.name(), p.kind(), p.is_detectable(), p.sample());
            }
        }
        OutputFormat::Text => {
            println!("{:<16} {:<6} {:<6} {}", "Name", "Kind", "Auto", "Sample");
            println!("{:-<60}", "");
            for p in protocols {
                let kind = match p.kind() {
                    FrameKind::AsciiLine => "ascii",
                    FrameKind::BinaryFrame => "binary",
                };
                let auto = if p.is_detectable() { "yes" } else { "no" };
                println!("{:<16} {:<6} {:<6} {}", p.name(), kind, auto, p.sample());
            }
        }
    }
    Ok(CliResult::success())
}

fn detect_lines(cli: &Cli, lines: &[String]) -> anyhow::Result<CliResult> {
    let lines: Vec<String> = if lines.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<Result<_, _>>()
            .context("reading stdin")?
    } else {
        lines.to_vec()
    };

    let mut missed = 0usize;
    if cli.format == OutputFormat::Csv {
        println!("line,protocol");
    }
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let found = detect(line);
        if found.is_none() {
            missed += 1;
        }
        let name = found.map_or("", |p| p.name());
        match cli.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "line": line, "protocol": found.map(|p| p.name()) })
            ),
            OutputFormat::Csv => println!("\"{}\",{}", line.replace('"', "\"\""), name),
            OutputFormat::Text => match found {
                Some(p) => println!("{line}\t{}", p.name()),
                None => println!("{line}\t(unrecognised)"),
            },
        }
    }

    if missed > 0 {
        return Ok(CliResult::error(
            ExitCodes::NOT_DETECTED,
            format!("{missed} line(s) not recognised"),
        ));
    }
    Ok(CliResult::success())
}

fn decode_frame(
    cli: &Cli,
    config: &AppConfig,
    selector: ProtocolSelector,
    is_hex: bool,
    data: &str,
) -> anyhow::Result<CliResult> {
    let raw = if is_hex {
        hex::decode(data.replace(' ', "")).context("invalid hex data")?
    } else {
        data.as_bytes().to_vec()
    };

    let readings = match selector {
        ProtocolSelector::Auto => match decode_auto(&raw) {
            Ok((protocol, readings)) => {
                info!(protocol = protocol.name(), "protocol detected");
                readings
            }
            Err(e) if e.is_benign() => {
                return Ok(CliResult::error(
                    ExitCodes::NOT_DETECTED,
                    "no protocol recognises this frame",
                ))
            }
            Err(e) => return Err(e.into()),
        },
        explicit => decode(explicit, &raw)?,
    };

    let formatter = ReadingFormatter::new(cli.format, config.display.unit, config.display.decimals);
    if let Some(header) = formatter.header() {
        println!("{header}");
    }
    let now = Local::now();
    for reading in &readings {
        println!("{}", formatter.reading(reading, now));
    }
    Ok(CliResult::success())
}

fn link_settings(config: &AppConfig, link: &LinkArgs) -> (ConnectionSettings, ProtocolSelector) {
    let mut settings = config.connection.line.clone();
    if let Some(baud) = link.baud {
        settings.baud_rate = baud;
    }
    if let Some(bits) = link.data_bits {
        settings.data_bits = bits;
    }
    if let Some(parity) = link.parity {
        settings.parity = parity;
    }
    if let Some(stop_bits) = link.stop_bits {
        settings.stop_bits = stop_bits;
    }
    if let Some(flow) = link.flow {
        settings.flow_control = flow;
    }
    let selector = link
        .protocol
        .or_else(|| config.protocol_selector().ok())
        .unwrap_or_default();
    (settings, selector)
}

fn port_name(config: &AppConfig, link: &LinkArgs) -> Result<String, SessionError> {
    link.port
        .clone()
        .or_else(|| config.connection.port.clone())
        .ok_or_else(|| {
            SessionError::InvalidArgument("no port given; pass --port or set connection.port".into())
        })
}

fn interrupts() -> anyhow::Result<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct MonitorPlan {
    formatter: ReadingFormatter,
    count: Option<u64>,
    stop_on_target: bool,
    timeout: Option<Duration>,
    replay: bool,
}

impl MonitorPlan {
    fn bounded(&self) -> bool {
        self.count.is_some() || self.stop_on_target
    }
}

enum End {
    Done,
    TimedOut,
    Interrupted,
    Stopped,
}

async fn monitor(
    config: &AppConfig,
    link: &LinkArgs,
    target: Option<(f64, f64)>,
    probe: bool,
    replay: Option<&Path>,
    plan: &MonitorPlan,
) -> anyhow::Result<CliResult> {
    let (settings, selector) = link_settings(config, link);
    let (events, rx) = broadcast::channel(256);
    let mut session = Session::new(selector, events);
    if let Some((target_kg, tolerance_kg)) = target {
        session.set_target(target_kg, Some(tolerance_kg))?;
    }
    let mut options = config.driver_options();
    options.probe_on_connect = probe;

    if let Some(header) = plan.formatter.header() {
        println!("{header}");
    }

    match replay {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let transport = MemoryTransport::with_chunks(
                data.chunks(REPLAY_CHUNK).map(Bytes::copy_from_slice),
            );
            transport.handle().close_when_drained();
            stream_readings(transport, session, rx, options, settings, plan).await
        }
        None => {
            let transport = SerialTransport::new(port_name(config, link)?);
            stream_readings(transport, session, rx, options, settings, plan).await
        }
    }
}

async fn stream_readings<T>(
    transport: T,
    session: EventSession,
    mut events: broadcast::Receiver<SessionEvent>,
    options: DriverOptions,
    settings: ConnectionSettings,
    plan: &MonitorPlan,
) -> anyhow::Result<CliResult>
where
    T: ByteTransport + 'static,
{
    let (driver, handle) = SessionDriver::new(transport, session, options);
    let mut task = driver.spawn(settings);
    let mut interrupted = interrupts()?;
    let deadline = plan.timeout.map(|t| Instant::now() + t);
    let mut readings = 0u64;
    let mut finished: Option<DriverOutcome<broadcast::Sender<SessionEvent>>> = None;

    let end = loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(SessionEvent::Reading { reading }) => {
                    println!("{}", plan.formatter.reading(&reading, Local::now()));
                    readings += 1;
                    if plan.count.is_some_and(|n| readings >= n) {
                        break End::Done;
                    }
                }
                Ok(SessionEvent::TargetReached { target_kg }) => {
                    println!("{}", plan.formatter.target_reached(target_kg, Local::now()));
                    if plan.count.is_none() {
                        break End::Done;
                    }
                }
                Ok(SessionEvent::StateChanged { state }) => debug!(%state, "state changed"),
                Ok(SessionEvent::Diagnostic { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break End::Stopped,
            },
            joined = &mut task => {
                finished = Some(joined?);
                break End::Stopped;
            }
            () = deadline_reached(deadline) => break End::TimedOut,
            Some(()) = interrupted.recv() => break End::Interrupted,
        }
    };

    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            if !matches!(end, End::Stopped) {
                close_session(&handle).await;
            }
            task.await?
        }
    };

    let stats = outcome.session.stats();
    info!(
        frames = stats.frames,
        readings = stats.readings,
        ignored = stats.ignored_frames,
        malformed = stats.malformed_frames,
        "session ended"
    );

    let result = match end {
        End::Done => CliResult::success(),
        End::Interrupted if plan.bounded() => CliResult::error(ExitCodes::CANCELLED, "interrupted"),
        End::TimedOut if plan.bounded() => {
            CliResult::timeout(format!("timed out after {readings} reading(s)"))
        }
        End::Interrupted | End::TimedOut => CliResult::success(),
        End::Stopped => match outcome.result {
            Ok(()) => CliResult::success(),
            Err(SessionError::Transport(TransportError::Disconnected)) if plan.replay => {
                if plan.bounded() {
                    CliResult::error(
                        ExitCodes::DISCONNECTED,
                        format!("replay ended after {readings} reading(s)"),
                    )
                } else {
                    CliResult::success()
                }
            }
            Err(e) => return Err(e.into()),
        },
    };
    Ok(result)
}

async fn device_command(
    config: &AppConfig,
    link: &LinkArgs,
    wait: u64,
    command: DeviceCommand,
) -> anyhow::Result<CliResult> {
    let (settings, selector) = link_settings(config, link);
    let port = port_name(config, link)?;
    let (events, mut rx) = broadcast::channel(64);
    let session = Session::new(selector, events);
    let mut options = config.driver_options();
    options.probe_on_connect = true;

    let (driver, handle) = SessionDriver::new(SerialTransport::new(port), session, options);
    let mut task = driver.spawn(settings);

    if selector == ProtocolSelector::Auto {
        let detected = tokio::select! {
            biased;
            found = first_reading(&mut rx) => found,
            joined = &mut task => {
                joined?.result?;
                false
            }
            () = tokio::time::sleep(Duration::from_secs(wait)) => false,
        };
        if !detected {
            close_session(&handle).await;
            return Ok(CliResult::error(
                ExitCodes::NOT_DETECTED,
                format!("no protocol detected within {wait}s"),
            ));
        }
    }

    let sent = match command {
        DeviceCommand::Tare => handle.tare().await,
        DeviceCommand::Zero => handle.zero().await,
        DeviceCommand::Calibrate(kg) => handle.calibrate(kg).await,
    };
    let status = handle.status().await.ok();
    close_session(&handle).await;
    let outcome = task.await?;

    if let Err(e) = sent {
        outcome.result?;
        return Err(e.into());
    }
    let connected_for = status.as_ref().and_then(|s| s.time_in_state);
    let protocol = status
        .and_then(|s| s.protocol)
        .map_or_else(|| "?".to_string(), |p| p.to_string());
    info!(%protocol, ?command, ?connected_for, "command sent");
    Ok(CliResult::Success(Some(format!("{command:?} sent ({protocol})"))))
}

async fn close_session(handle: &SessionHandle) {
    match handle.disconnect().await {
        Ok(()) | Err(SessionError::Closed) => {}
        Err(e) => warn!(error = %e, "disconnect failed"),
    }
}

async fn first_reading(rx: &mut broadcast::Receiver<SessionEvent>) -> bool {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::Reading { .. }) => return true,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

fn handle_config(cli: &Cli, config: &AppConfig, action: &ConfigAction) -> anyhow::Result<CliResult> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => config::config_path(),
    };

    match action {
        ConfigAction::Show => {
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
                _ => print!("{}", config.to_toml()?),
            }
            Ok(CliResult::success())
        }
        ConfigAction::Path => {
            match path {
                Some(path) => println!("{}", path.display()),
                None => {
                    return Ok(CliResult::error(
                        ExitCodes::CONFIG_ERROR,
                        "could not determine config directory",
                    ))
                }
            }
            Ok(CliResult::success())
        }
        ConfigAction::Init { force } => {
            let Some(path) = path else {
                return Ok(CliResult::error(
                    ExitCodes::CONFIG_ERROR,
                    "could not determine config directory",
                ));
            };
            if path.exists() && !force {
                return Ok(CliResult::error(
                    ExitCodes::CONFIG_ERROR,
                    format!("{} exists; pass --force to overwrite", path.display()),
                ));
            }
            AppConfig::default().save_to(&path)?;
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(CliResult::success())
        }
    }
}
