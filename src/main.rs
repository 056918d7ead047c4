//! Behavioral Auth Agent CLI
//!
//! Continuous authentication from keystroke, motion and pointer rhythm.

use anyhow::Context;
use behavioral_auth_agent::{
    collector::{
        read_recording, replay_events, CaptureConfig, CaptureTarget, InputCapture, InputEvent,
        MonotonicClock, Replay,
    },
    config::{CaptureSources, Config},
    core::{
        extract_features, AuthEvent, AuthRunner, ContinuousAuthController, ControllerConfig,
        DeviceInfo,
    },
    transparency::create_shared_log,
    verdict::{FeatureEnrollmentRequest, HttpVerdictClient, TypingPatternRequest, Verdict},
    PRIVACY_DECLARATION, VERSION,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bioauth")]
#[command(version = VERSION)]
#[command(about = "Continuous behavioral authentication agent", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start continuous authentication for a user
    Start(StartArgs),

    /// Replay a recorded event stream and print its feature vector
    Extract {
        /// JSON Lines file of input events
        file: PathBuf,

        /// Input sources to include (keyboard, motion, pointer, or all)
        #[arg(long, default_value = "all")]
        sources: String,
    },

    /// Enroll a user from a recorded event stream, a typing pattern, or both
    Enroll(EnrollArgs),

    /// Check a typing pattern against the user's saved patterns
    Verify {
        #[arg(long)]
        user: String,

        /// Opaque typing pattern string
        #[arg(long)]
        pattern: String,

        /// Identifier of the text that was typed
        #[arg(long, default_value = "0")]
        text_id: String,

        /// Verdict service base URL
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Show the device description sent with each submission
    Device,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct EnrollArgs {
    #[arg(long)]
    user: String,

    /// JSON Lines file of input events to enroll as one feature sample
    #[arg(long)]
    events: Option<PathBuf>,

    /// Input sources to include from the recording (keyboard, motion, pointer, or all)
    #[arg(long, default_value = "all")]
    sources: String,

    /// Opaque typing pattern string
    #[arg(long)]
    pattern: Option<String>,

    /// Identifier of the text that was typed
    #[arg(long, default_value = "0")]
    text_id: String,

    /// Verdict service base URL
    #[arg(long)]
    endpoint: Option<String>,
}

#[derive(Args)]
struct StartArgs {
    /// User to authenticate continuously
    #[arg(long)]
    user: String,

    /// Input sources to capture (keyboard, motion, pointer, or all)
    #[arg(long, default_value = "all")]
    sources: String,

    /// Authentication cycle period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Verdict service base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Only accept events tagged with this target
    #[arg(long)]
    target: Option<String>,

    /// Read input events as JSON Lines from standard input
    #[arg(long)]
    stdin: bool,

    /// Ingest server port (requires server feature)
    #[arg(long)]
    port: Option<u16>,

    /// Do not start the ingest server
    #[arg(long)]
    no_server: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Start(args) => cmd_start(config, args),
        Commands::Extract { file, sources } => cmd_extract(&config, &file, &sources),
        Commands::Enroll(args) => cmd_enroll(config, args),
        Commands::Verify {
            user,
            pattern,
            text_id,
            endpoint,
        } => cmd_verify(config, user, pattern, text_id, endpoint),
        Commands::Device => cmd_device(&config),
        Commands::Privacy => cmd_privacy(),
        Commands::Config { write } => cmd_config(&config, cli.config.as_deref(), write),
    }
}

/// Log to stderr, `info` unless `RUST_LOG` says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Config {
    let result = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    })
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating async runtime: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_start(mut config: Config, args: StartArgs) {
    println!("Behavioral Auth Agent v{VERSION}");
    println!();

    config.sources = CaptureSources::from_csv(&args.sources);
    if !config.sources.any_enabled() {
        eprintln!("Error: At least one source must be enabled (keyboard, motion or pointer)");
        std::process::exit(1);
    }
    if let Some(ms) = args.interval_ms {
        if ms == 0 {
            eprintln!("Error: --interval-ms must be greater than zero");
            std::process::exit(1);
        }
        config.interval = Duration::from_millis(ms);
    }
    if let Some(endpoint) = args.endpoint.clone() {
        config.verdict.base_url = endpoint;
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }

    println!("Starting continuous authentication...");
    println!("  User: {}", args.user);
    println!("  Keyboard: {}", enabled(config.sources.keyboard));
    println!("  Motion: {}", enabled(config.sources.motion));
    println!("  Pointer: {}", enabled(config.sources.pointer));
    println!("  Cycle interval: {}ms", config.interval.as_millis());
    println!("  Verdict service: {}", config.verdict.base_url);

    if let Err(e) = runtime().block_on(run_agent(config, args)) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_agent(config: Config, args: StartArgs) -> anyhow::Result<()> {
    let stats = create_shared_log();
    let capture = InputCapture::new(
        CaptureConfig {
            sources: config.sources.clone(),
            queue_capacity: config.queue_capacity,
        },
        MonotonicClock::shared(),
        stats.clone(),
    );

    let mut controller_config = ControllerConfig::from(&config);
    if let Some(target) = args.target {
        controller_config.target = CaptureTarget::Named(target);
    }
    let device = DeviceInfo::detect(&config.device);
    let controller = ContinuousAuthController::new(controller_config, capture, device, stats.clone());
    let sink = controller.input_sink();

    let client = HttpVerdictClient::new(config.verdict.clone())?;
    match client.test_connection().await {
        Ok(true) => println!("  Verdict service connection: OK"),
        Ok(false) => eprintln!("Warning: Verdict service health check failed"),
        Err(e) => eprintln!("Warning: Could not connect to verdict service: {e}"),
    }

    let (runner, handle, mut events) =
        AuthRunner::new(controller, Arc::new(client), config.drain_interval);
    let runner_task = tokio::spawn(runner.run());

    #[cfg(feature = "server")]
    let server_shutdown = if args.no_server {
        println!("  Ingest server: disabled");
        None
    } else {
        use behavioral_auth_agent::server::{self, ServerConfig, ServerState};
        let state = ServerState::new(sink.clone(), handle.clone());
        let (addr, shutdown_tx) = server::run(ServerConfig::new(config.server_port), state)
            .await
            .context("Failed to start ingest server")?;
        println!("  Ingest server: http://{addr}");
        Some(shutdown_tx)
    };
    #[cfg(not(feature = "server"))]
    if !args.no_server {
        eprintln!("Warning: ingest server not available (server feature not enabled at compile time)");
    }

    if args.stdin {
        println!("  Reading input events from stdin");
        let sink = sink.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InputEvent>(&line) {
                    Ok(event) => {
                        if sink.send(event).is_err() {
                            tracing::warn!("input queue rejected a stdin event");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping malformed stdin event"),
                }
            }
        });
    }
    drop(sink);

    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || ctrlc_handle.shutdown())
        .context("Error setting Ctrl+C handler")?;

    handle.start(args.user).await?;

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // The channel closes once the runner exits.
    while let Some(event) = events.recv().await {
        print_event(&event);
    }
    runner_task.await.context("Controller task failed")?;

    #[cfg(feature = "server")]
    if let Some(shutdown_tx) = server_shutdown {
        let _ = shutdown_tx.send(());
    }

    println!();
    println!("Stopping continuous authentication...");
    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn print_event(event: &AuthEvent) {
    let now = Local::now().format("%H:%M:%S");
    match event {
        AuthEvent::Verdict { cycle, result } => println!(
            "[{now}] Cycle {cycle}: {} (confidence {:.2}, risk {})",
            verdict_label(result.verdict),
            result.confidence,
            result.risk_level
        ),
        AuthEvent::StepUpRequired { cycle, result } => {
            println!(
                "[{now}] Cycle {cycle}: {} (confidence {:.2}, risk {})",
                verdict_label(result.verdict),
                result.confidence,
                result.risk_level
            );
            println!("[{now}] Step-up verification required. Submit the code via POST /step-up");
        }
        AuthEvent::StepUpResolved => println!("[{now}] Step-up verification accepted"),
        AuthEvent::SubmissionFailed { cycle, error } => {
            eprintln!("[{now}] Cycle {cycle}: submission failed: {error}")
        }
        AuthEvent::SessionTerminated { user_id } => {
            println!("[{now}] Session terminated for {user_id}")
        }
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Genuine => "genuine",
        Verdict::Impostor => "impostor",
        Verdict::Unknown => "unknown",
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

/// Read and replay a recording, exiting on failure.
fn load_replay(file: &Path, sources: &str) -> Replay {
    let file_handle = match std::fs::File::open(file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let recording = match read_recording(std::io::BufReader::new(file_handle)) {
        Ok(recording) => recording,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };
    for (line, error) in &recording.skipped {
        eprintln!("Warning: skipping line {line}: {error}");
    }

    match replay_events(&recording.events, CaptureSources::from_csv(sources)) {
        Ok(replay) => replay,
        Err(e) => {
            eprintln!("Error replaying {file:?}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_extract(config: &Config, file: &Path, sources: &str) {
    let replay = load_replay(file, sources);
    let session = &replay.session;
    let features = extract_features(session, &config.outlier_bounds);

    println!(
        "Replayed {} events ({} recorded) over {:.1}s",
        replay.total,
        replay.recorded,
        session.duration_secs()
    );
    println!(
        "  keys: {}  motion: {}  orientation: {}  pointer: {}",
        session.key_events().len(),
        session.motion_events().len(),
        session.orientation_events().len(),
        session.pointer_events().len()
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&features.to_map()).unwrap_or_else(|_| "Error".to_string())
    );
}

fn verdict_client(mut config: Config, endpoint: Option<String>) -> HttpVerdictClient {
    if let Some(endpoint) = endpoint {
        config.verdict.base_url = endpoint;
    }
    match HttpVerdictClient::new(config.verdict) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_enroll(config: Config, args: EnrollArgs) {
    if args.events.is_none() && args.pattern.is_none() {
        eprintln!("Error: provide --events, --pattern, or both");
        std::process::exit(1);
    }

    let bounds = config.outlier_bounds;
    let device = DeviceInfo::detect(&config.device);
    let client = verdict_client(config, args.endpoint);
    let runtime = runtime();

    let Some(file) = args.events else {
        // Pattern only: store it with the typing-pattern service.
        let request = TypingPatternRequest {
            user_id: args.user,
            typing_pattern: args.pattern.unwrap_or_default(),
            text_id: args.text_id,
            quality: None,
        };
        match runtime.block_on(client.save_typing_pattern(&request)) {
            Ok(response) => {
                println!("Typing pattern saved for {}", request.user_id);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&response).unwrap_or_else(|_| "Error".to_string())
                );
            }
            Err(e) => {
                eprintln!("Error saving typing pattern: {e}");
                std::process::exit(1);
            }
        }
        return;
    };

    let replay = load_replay(&file, &args.sources);
    let features = extract_features(&replay.session, &bounds);
    let request = FeatureEnrollmentRequest {
        user_id: args.user,
        features: features.to_map(),
        device_info: Some(device),
        typing_pattern: args.pattern,
    };

    match runtime.block_on(client.enroll_features(&request)) {
        Ok(response) => {
            println!(
                "Enrolled {} ({} recorded events): {} sample(s) on file",
                response.user_id, replay.recorded, response.enrollment_count
            );
            if let Some(info) = &response.train_info {
                println!("  Training: {info}");
            }
            println!(
                "  Ready to authenticate: {}",
                if response.can_authenticate { "yes" } else { "no" }
            );
        }
        Err(e) => {
            eprintln!("Error enrolling features: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_verify(
    config: Config,
    user: String,
    pattern: String,
    text_id: String,
    endpoint: Option<String>,
) {
    let client = verdict_client(config, endpoint);
    let request = TypingPatternRequest {
        user_id: user,
        typing_pattern: pattern,
        text_id,
        quality: None,
    };

    match runtime().block_on(client.verify_typing_pattern(&request)) {
        Ok(response) => println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "Error".to_string())
        ),
        Err(e) => {
            eprintln!("Error verifying typing pattern: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_device(config: &Config) {
    let device = DeviceInfo::detect(&config.device);
    println!(
        "{}",
        serde_json::to_string_pretty(&device).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config(config: &Config, path: Option<&Path>, write: bool) {
    if write {
        let result = match path {
            Some(path) => config.save_to(path),
            None => config.save(),
        };
        if let Err(e) = result {
            eprintln!("Error writing config: {e}");
            std::process::exit(1);
        }
    }

    println!("Configuration");
    println!("=============");
    println!();
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    println!("Config file: {path:?}{}", if write { " (written)" } else { "" });
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}
