//! `rivet-cli` – command line front end of the rivet task sequencer.
//!
//! This binary drives the four task programs against a simulated cell.  It:
//!
//! 1. Checks for `~/.rivet/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Drops the user into an **interactive REPL** with slash-commands
//!    (`/run`, `/scenarios`, `/profile`, `/settings`, `/recordings`, `/help`).
//! 3. Intercepts **Ctrl-C**: during a run it triggers the controller's
//!    external stop so the in-flight motion aborts and teardown runs; when
//!    idle it exits.

mod cell;
mod config;
mod console_prompt;
mod repl;

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

use rivet_runtime::ScenarioKind;
use rivet_runtime::telemetry;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG (default "info"), RIVET_LOG_FORMAT=json, and span export when
    // OTEL_EXPORTER_OTLP_ENDPOINT is set. The guard flushes spans on exit.
    let _telemetry = telemetry::init_tracing("rivet");

    print_banner();

    // Observer tasks and recorder lanes run here; sequences run on this thread.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            println!("{}: {}", "Fatal".red().bold(), e);
            std::process::exit(1);
        }
    };

    // ── Shared state ──────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let active: repl::ActiveGate = Arc::new(Mutex::new(None));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown_clone = shutdown.clone();
    let active_clone = active.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        let gate = active_clone.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match gate {
            Some(gate) => {
                println!("{}", "⚠  Ctrl-C received – stopping the arm …".yellow().bold());
                gate.external_stop();
                println!("{}", "  ✓ External stop sent; teardown will run.".green());
            }
            None => {
                println!("{}", "⚠  Ctrl-C received – exiting rivet.".yellow().bold());
                println!("{}", "  ✓ No motion in progress. Press Enter to leave.".green());
                shutdown_clone.store(true, Ordering::SeqCst);
            }
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; external stop on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            println!(
                "  Recordings: {}   Policy: {}   Default: {}",
                cfg.recordings_db().display().to_string().dimmed(),
                cfg.busy_policy.to_string().yellow(),
                cfg.default_scenario.to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown, active, runtime.handle().clone());
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        rivet First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the cell.\n");

    let mut cfg = config::Config::default();

    println!("  Which scenario should /run start by default?");
    for (i, kind) in ScenarioKind::ALL.iter().enumerate() {
        println!("    {}) {:<16} {}", i + 1, kind.as_str(), kind.summary().dimmed());
    }
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.default_scenario = choice
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| ScenarioKind::ALL.get(i).copied())
        .unwrap_or_default();

    println!("  When a motion arrives while the arm is busy:");
    println!("    1) Queue it until the arm is free  (default)");
    println!("    2) Reject it");
    if prompt_line("  Enter choice [1]: ", "1").trim() == "2" {
        cfg.busy_policy = rivet_kernel::BusyPolicy::Reject;
    }

    let dir = prompt_line(
        &format!("  Recordings directory [{}]: ", cfg.recordings_dir.display()),
        &cfg.recordings_dir.to_string_lossy(),
    );
    cfg.recordings_dir = dir.into();

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"         _            __ "#.bold().cyan());
    println!("{}", r#"   _____(_)   _____  / /_"#.bold().cyan());
    println!("{}", r#"  / ___/ / | / / _ \/ __/"#.bold().cyan());
    println!("{}", r#" / /  / /| |/ /  __/ /_  "#.bold().cyan());
    println!("{}", r#"/_/  /_/ |___/\___/\__/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "rivet".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Event-driven robot task sequencer");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
