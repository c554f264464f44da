//! `thr-scene-state` – runs the scene predicate engine as a standalone node.
//!
//! 1. Initialises tracing (console, JSON or OTLP, see [`telemetry`]).
//! 2. Loads `thr.toml` (or `--config` / `THR_CONFIG`) and seeds the
//!    in-process transform graph with its static frames.
//! 3. Starts the action-history listener and the periodic snapshot builder.
//! 4. Optionally replays newline-delimited JSON action events from
//!    `--events <file>` (or `-` for stdin) onto the bus.
//! 5. Stops both tasks on Ctrl-C and prints the final scene.

mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use thr_middleware::EventBus;
use thr_perception::TfGateway;
use thr_scene::{BusSink, LogSink, SceneStateManager};
use thr_types::ActionEvent;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

const NODE: &str = "thr-scene-state";
const REPLAY_SOURCE: &str = "thr-replay";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<String>,
    events: Option<String>,
}

/// `Ok(None)` when help was requested.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Args>, String> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => {
                parsed.config = Some(args.next().ok_or("--config needs a path")?);
            }
            "-e" | "--events" => {
                parsed.events = Some(args.next().ok_or("--events needs a path or -")?);
            }
            other => return Err(format!("unknown argument {other}")),
        }
    }
    Ok(Some(parsed))
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    // Before the runtime exists: the OTLP exporter is synchronous.
    let _guard = telemetry::init_tracing(NODE);
    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let path = config::config_path(args.config.as_deref());
    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  {} No config at {}; tracking no objects.",
                "!".yellow().bold(),
                path.display().to_string().bold()
            );
            config::Config::default()
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let gateway = TfGateway::new(None);
    cfg.seed(&gateway);

    let mut manager = match SceneStateManager::new(cfg.scene, Arc::new(gateway)) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let bus = EventBus::default();
    manager.add_sink(Box::new(LogSink));
    manager.add_sink(Box::new(BusSink::new(bus.clone(), NODE)));
    let manager = Arc::new(manager);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let ctrlc_tx = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the scene state node …".yellow().bold());
        let _ = ctrlc_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the node can only be killed");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let listener = manager.spawn_event_listener(&bus, stop_rx.clone());
        if let Some(source) = args.events {
            tokio::spawn(replay_events(source, bus.clone()));
        }
        let builder = manager.spawn(stop_rx);
        println!("  {} Publishing scene state. Press Ctrl-C to stop.\n", "✓".green().bold());

        for handle in [builder, listener] {
            if let Err(e) = handle.await {
                error!(error = %e, "scene task failed");
            }
        }
    });
    // A replay still blocked on stdin must not keep the process alive.
    runtime.shutdown_timeout(Duration::from_millis(200));

    print_summary(&manager);
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Event replay
// ─────────────────────────────────────────────────────────────────────────────

/// Publish one [`ActionEvent`] per JSON line.  Blank lines and `#` comments
/// are skipped; malformed lines are logged and skipped.
async fn replay_events(source: String, bus: EventBus) {
    let reader: Box<dyn AsyncRead + Unpin + Send> = if source == "-" {
        Box::new(tokio::io::stdin())
    } else {
        match tokio::fs::File::open(&source).await {
            Ok(file) => Box::new(file),
            Err(e) => {
                error!(path = %source, error = %e, "cannot open event file");
                return;
            }
        }
    };

    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    let mut published = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(path = %source, error = %e, "event replay aborted");
                break;
            }
        };
        line_no += 1;
        match parse_event_line(&line) {
            Ok(None) => {}
            Ok(Some(event)) => match bus.publish_action(REPLAY_SOURCE, event) {
                Ok(_) => published += 1,
                Err(e) => warn!(line = line_no, error = %e, "event not delivered"),
            },
            Err(e) => warn!(line = line_no, error = %e, "skipping malformed event"),
        }
    }
    info!(path = %source, published, "event replay finished");
}

fn parse_event_line(line: &str) -> Result<Option<ActionEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}", "THR scene state".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Symbolic predicates for human-robot toolbox assembly");
    println!();
}

fn print_usage() {
    println!("Usage: {NODE} [--config <path>] [--events <path|->]");
    println!();
    println!("  -c, --config <path>   scene configuration (default: $THR_CONFIG or ./thr.toml)");
    println!("  -e, --events <path>   replay JSON-lines action events, `-` for stdin");
    println!("  -h, --help            print this help");
}

fn print_summary(manager: &SceneStateManager) {
    let snapshot = manager.latest();
    println!();
    println!("  {} ({} predicates)", "Final scene".bold(), snapshot.len());
    for predicate in snapshot.iter() {
        println!("    • {predicate}");
    }
    let attached = manager.attached_pairs();
    if !attached.is_empty() {
        println!("  {} {} pair(s) attached this episode", "✓".green().bold(), attached.len());
    }
}
