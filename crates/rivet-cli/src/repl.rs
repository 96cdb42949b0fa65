//! REPL – the interactive `rivet>` shell.
//!
//! Supported slash-commands:
//!   /run [scenario]     – run a scenario on the simulated cell
//!   /scenarios          – list the scenarios
//!   /profile [scenario] – print a scenario's task profile as TOML
//!   /settings           – interactively edit `~/.rivet/config.toml`
//!   /recordings         – list the persisted recording sessions
//!   /help               – show this list
//!   /quit | /exit       – exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rivet_hal::OperatorPrompt;
use rivet_hal::sim::SimMotionController;
use rivet_kernel::{ActuatorGate, BusyPolicy};
use rivet_middleware::{EventBus, Topic};
use rivet_recorder::SqliteRecorder;
use rivet_runtime::{ScenarioKind, SequenceReport, StepOutcome, TaskRunner};
use rivet_types::{Event, EventPayload, RivetError};
use tokio::runtime::Handle;
use tracing::debug;

use crate::cell::{self, SimCell};
use crate::config::{self, Config};
use crate::console_prompt::ConsolePrompt;

/// The gate of the run in progress, if any. Ctrl-C stops it.
pub type ActiveGate = Arc<Mutex<Option<Arc<ActuatorGate>>>>;

fn set_active(active: &ActiveGate, gate: Option<Arc<ActuatorGate>>) {
    *active.lock().unwrap_or_else(PoisonError::into_inner) = gate;
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shutdown: Arc<AtomicBool>, active: ActiveGate, runtime: Handle) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let prompt: Arc<dyn OperatorPrompt> = Arc::new(ConsolePrompt::stdin());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "rivet>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let arg = words.next();

        match cmd {
            "/help" => cmd_help(),
            "/run" => cmd_run(arg, &prompt, &active, &runtime),
            "/scenarios" => cmd_scenarios(),
            "/profile" => cmd_profile(arg),
            "/settings" => cmd_settings(),
            "/recordings" => cmd_recordings(),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "rivet Commands".bold().underline());
    println!("  {}     – run a scenario on the simulated cell", "/run [scenario]".bold().cyan());
    println!("  {}          – list the scenarios", "/scenarios".bold().cyan());
    println!("  {} – print a task profile as TOML", "/profile [scenario]".bold().cyan());
    println!("  {}           – edit ~/.rivet/config.toml settings", "/settings".bold().cyan());
    println!("  {}         – list persisted recordings", "/recordings".bold().cyan());
    println!("  {}       – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!("  Ctrl-C during a run stops the arm; teardown still runs.");
    println!();
}

fn cmd_scenarios() {
    let cfg = load_config_or_default();
    println!("{}", "Scenarios".bold().underline());
    for kind in ScenarioKind::ALL {
        let marker = if kind == cfg.default_scenario { "▶" } else { " " };
        println!("  {} {:<16} {}", marker.green(), kind.as_str().bold(), kind.summary().dimmed());
    }
}

fn cmd_profile(arg: Option<&str>) {
    let cfg = load_config_or_default();
    let Some(kind) = scenario_or_default(arg, &cfg) else {
        return;
    };
    let profiles = match cfg.profiles() {
        Ok(p) => p,
        Err(e) => {
            println!("{}: {}", "Profile error".red(), e);
            return;
        }
    };
    match toml::to_string_pretty(profiles.get(kind)) {
        Ok(text) => {
            println!("{}", format!("# [profiles.{kind}]").dimmed());
            println!("{text}");
        }
        Err(e) => println!("{}: {}", "Profile error".red(), e),
    }
}

fn cmd_run(arg: Option<&str>, prompt: &Arc<dyn OperatorPrompt>, active: &ActiveGate, runtime: &Handle) {
    let cfg = load_config_or_default();
    let Some(kind) = scenario_or_default(arg, &cfg) else {
        return;
    };

    println!();
    println!("{}", "═══════════════════════════════════════".bold());
    println!("{}", format!("  Scenario: {kind}").bold().cyan());
    println!(
        "  {} · policy {} · {} ms/segment",
        kind.summary().dimmed(),
        cfg.busy_policy.to_string().yellow(),
        cfg.sim_step_ms
    );
    println!("{}", "═══════════════════════════════════════".bold());

    match run_scenario(&cfg, kind, Arc::clone(prompt), active, runtime) {
        Ok((report, alerts)) => print_report(&report, &alerts),
        Err(e) => println!("  {}: {}", "Run failed".red().bold(), e),
    }
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!("  (press Enter to keep the current value)");

    let policy = prompt_str(
        &format!("  Busy policy (queue / reject) [{}]: ", cfg.busy_policy),
        &cfg.busy_policy.to_string(),
    );
    match policy.parse::<BusyPolicy>() {
        Ok(p) => cfg.busy_policy = p,
        Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.busy_policy),
    }

    cfg.sim_step_ms = prompt_u64(
        &format!("  Simulated time per segment, ms [{}]: ", cfg.sim_step_ms),
        cfg.sim_step_ms,
    );

    let dir = prompt_str(
        &format!("  Recordings directory [{}]: ", cfg.recordings_dir.display()),
        &cfg.recordings_dir.to_string_lossy(),
    );
    cfg.recordings_dir = PathBuf::from(dir);

    let scenario = prompt_str(
        &format!("  Default scenario [{}]: ", cfg.default_scenario),
        cfg.default_scenario.as_str(),
    );
    match scenario.parse::<ScenarioKind>() {
        Ok(k) => cfg.default_scenario = k,
        Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.default_scenario),
    }

    let current = cfg
        .profile_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    let file = prompt_str(&format!("  Profile override file (or 'none') [{current}]: "), &current);
    cfg.profile_file = match file.as_str() {
        "none" | "-" => None,
        path => Some(PathBuf::from(path)),
    };

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn cmd_recordings() {
    let cfg = load_config_or_default();
    let db = cfg.recordings_db();

    println!("{}", "Recordings".bold().underline());
    if !db.exists() {
        println!("  {}", "No recordings yet.".dimmed());
        return;
    }
    let store = match SqliteRecorder::open(&db, Arc::new(SimMotionController::new(cell::CONTROLLER_ID))) {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Recorder error".red(), e);
            return;
        }
    };
    match store.sessions() {
        Ok(sessions) if sessions.is_empty() => println!("  {}", "No recordings yet.".dimmed()),
        Ok(sessions) => {
            for s in sessions {
                let started = s.started_at.with_timezone(&chrono::Local);
                println!(
                    "  {} {:<16} {:>6} samples  {}",
                    started.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    s.name.bold(),
                    s.sample_count,
                    s.id.to_string().dimmed()
                );
            }
        }
        Err(e) => println!("{}: {}", "Recorder error".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Running a scenario
// ─────────────────────────────────────────────────────────────────────────────

/// Initialise and run `kind` on a fresh simulated cell.
///
/// The gate is published in `active` for the duration of the run. Alerts
/// raised on the bus during the run are returned with the report.
pub(crate) fn run_scenario(
    cfg: &Config,
    kind: ScenarioKind,
    prompt: Arc<dyn OperatorPrompt>,
    active: &ActiveGate,
    runtime: &Handle,
) -> Result<(SequenceReport, Vec<Event>), RivetError> {
    let profiles = cfg.profiles()?;
    let cell = SimCell::assemble(cfg, kind, prompt)?;
    let bus = EventBus::default();
    let mut alerts = bus.subscribe_to(Topic::Alerts);

    let mut runner = TaskRunner::new(profiles.get(kind).clone(), cell.devices.clone(), runtime.clone())
        .with_policy(cfg.busy_policy)
        .with_bus(bus);
    runner.initialize()?;

    set_active(active, runner.gate());
    let report = runner.run();
    set_active(active, None);
    debug!(motions = cell.controller.commands().len(), "cell idle");

    Ok((report?, alerts.drain()))
}

fn print_report(report: &SequenceReport, alerts: &[Event]) {
    println!();
    for step in &report.steps {
        let n = format!("[{:>2}/{}]", step.index + 1, report.steps.len());
        match &step.outcome {
            StepOutcome::Completed => println!("  {} {} … {}", n, step.label.bold(), "OK".green()),
            StepOutcome::Ignored(e) => {
                println!("  {} {} … {} ({})", n, step.label.bold(), "IGNORED".yellow(), e)
            }
            StepOutcome::Failed(e) => {
                println!("  {} {} … {}: {}", n, step.label.bold(), "FAILED".red(), e)
            }
            StepOutcome::Skipped => println!("  {} {} … {}", n, step.label.dimmed(), "skipped".dimmed()),
        }
    }

    for alert in alerts {
        match &alert.payload {
            EventPayload::HandlerFailed { observer, error } => {
                println!("  {} handler for '{}' failed: {}", "⚠".yellow(), observer, error)
            }
            EventPayload::MissedSamples { observer, count } => {
                println!("  {} observer '{}' missed {} samples", "⚠".yellow(), observer, count)
            }
            _ => {}
        }
    }
    for e in &report.teardown_errors {
        println!("  {} teardown: {}", "⚠".yellow(), e);
    }

    println!("{}", "═══════════════════════════════════════".bold());
    match &report.fault {
        None => println!(
            "  {} {} finished: {} steps completed",
            "✓".green().bold(),
            report.task.bold(),
            report.completed()
        ),
        Some(fault) => println!(
            "  {} {} aborted: {} ({} completed, {} skipped)",
            "✗".red().bold(),
            report.task.bold(),
            fault,
            report.completed(),
            report.skipped()
        ),
    }
    if let Some(location) = &report.artifact {
        println!("  Recording saved to {}", location.to_string().bold());
    }
    println!("{}", "═══════════════════════════════════════".bold());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

fn scenario_or_default(arg: Option<&str>, cfg: &Config) -> Option<ScenarioKind> {
    match arg.map(str::parse::<ScenarioKind>) {
        None => Some(cfg.default_scenario),
        Some(Ok(kind)) => Some(kind),
        Some(Err(e)) => {
            println!("{} Try {}.", e.to_string().red(), "/scenarios".bold());
            None
        }
    }
}

/// Prompt for a u64 value.  Returns `default` when the user presses Enter.
fn prompt_u64(msg: &str, default: u64) -> u64 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            println!("  {} '{}' is not a number, keeping {}", "Warning:".yellow(), raw, default);
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() { default.to_string() } else { trimmed }
        }
        Err(_) => default.to_string(),
    }
}
