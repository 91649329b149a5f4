//! `facereach` – interactive shell for the dual-arm face-reach stack.
//!
//! 1. Loads `~/.facereach/config.toml`, writing defaults when it is absent.
//! 2. Installs tracing (console plus optional OTLP export).
//! 3. Starts the motion facade against the simulated arms.
//! 4. Drops the user into a REPL (`/help` lists commands).
//!
//! Ctrl-C publishes a fault on the system-alert topic and exits the REPL.

mod config;
mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use facereach_hal::sim::SimLog;
use facereach_middleware::{EventBus, Topic};
use facereach_motion::{MotionHardware, MotionServiceFacade};
use facereach_runtime::init_tracing;
use facereach_types::{Event, EventPayload};
use tracing::{error, info, warn};

fn main() {
    print_banner();

    let cfg = load_config();
    let _guard = init_tracing("facereach", cfg.log_format);

    let shutdown = Arc::new(AtomicBool::new(false));
    let bus = EventBus::default();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown_ctrlc = Arc::clone(&shutdown);
    let bus_ctrlc = bus.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        bus_ctrlc.publish_lossy(
            Topic::SystemAlerts,
            Event::new(
                "facereach-cli",
                EventPayload::Fault {
                    component: "cli".to_string(),
                    message: "operator interrupt".to_string(),
                },
            ),
        );
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            std::process::exit(1);
        }
    };

    // ── Motion facade ─────────────────────────────────────────────────────
    let hardware = MotionHardware::simulated(&SimLog::new());
    let facade = match MotionServiceFacade::start(cfg.facade.clone(), cfg.planner.clone(), hardware) {
        Ok(facade) => facade,
        Err(e) => {
            error!(error = %e, "motion facade failed to start");
            println!("{}: {}", "Startup failed".red().bold(), e);
            std::process::exit(1);
        }
    };
    if !facade.scene_ready() {
        println!("  {}", "Collision object not confirmed; planning without it.".yellow());
    }
    info!(reach_side = %cfg.reach_side, "facereach ready");

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let session = repl::Session {
        config: cfg,
        facade: Arc::new(facade),
        bus,
        runtime,
    };
    repl::run(&session, shutdown);
}

/// Config from disk, or defaults.  A missing file is created so the user
/// has something to edit.
fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  Default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Config error".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ┌─────────────────────────────────────┐".bold().cyan());
    println!("{}", "  │              facereach              │".bold().cyan());
    println!("{}", "  │     face lock · forehead · reach    │".bold().cyan());
    println!("{}", "  └─────────────────────────────────────┘".bold().cyan());
    println!("  v{}", env!("CARGO_PKG_VERSION").dimmed());
    println!();
}
