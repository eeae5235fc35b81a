//! Binary entry point: config loading, logging, signal handling, and dispatch.

mod cli;
mod dispense;
mod error_fmt;

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::dispense::{RunSpec, run_dispense, self_check, snapshot_json};
use crate::error_fmt::{
    exit_code_for_error, exit_code_for_fault, fault_text, format_error_json, format_fault_json,
    humanize,
};
use dispense_core::SessionDefaults;
use dispense_core::runner::RunOutcome;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => std::process::exit(report_failure(&e)),
    };

    init_logging(&cli, &cfg.logging);
    if let Err(e) = color_eyre::install() {
        tracing::warn!(error = %e, "color-eyre install failed; continuing");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
        }
    }

    let code = match cli.cmd {
        Commands::Run {
            pump,
            liters,
            no_auto_stop,
            timeout_ms,
            threshold_l,
            rate_lpm,
            poll_hz,
        } => {
            let mut defaults = SessionDefaults::from(&cfg.session);
            if let Some(ms) = timeout_ms {
                defaults.timeout_ms = ms;
            }
            if let Some(l) = threshold_l {
                defaults.completion_threshold_l = l;
            }
            let spec = RunSpec {
                pump,
                target_l: liters,
                auto_stop: !no_auto_stop,
                rate_lpm,
                poll_hz: poll_hz.unwrap_or(cfg.feed.poll_rate_hz),
                read_timeout: Duration::from_millis(cfg.feed.read_timeout_ms),
                defaults,
                channels: cfg.station.pumps,
            };
            cmd_run(&spec, &shutdown, cli.json)
        }
        Commands::SelfCheck => cmd_self_check(&cfg, cli.json),
    };
    std::process::exit(code);
}

fn cmd_run(spec: &RunSpec, shutdown: &Arc<AtomicBool>, json: bool) -> i32 {
    let report = match run_dispense(spec, Arc::clone(shutdown)) {
        Ok(report) => report,
        Err(e) => return report_failure(&e),
    };

    for event in &report.events {
        tracing::debug!(?event, "engine event");
    }
    if json {
        for snap in &report.snapshots {
            println!("{}", snapshot_json(snap));
        }
    }

    match report.outcome {
        RunOutcome::Complete => {
            if !json {
                if let Some(s) = report.snapshots.iter().find(|s| s.pump == spec.pump) {
                    println!(
                        "dispense complete: pump {} delivered {:.3} L of {:.3} L in {} ms",
                        s.pump, s.dispensed_l, s.target_l, s.elapsed_ms
                    );
                }
            }
            0
        }
        RunOutcome::Idle => {
            if !json {
                println!("nothing to do: pump {} is idle", spec.pump);
            }
            0
        }
        RunOutcome::Faulted(cause) => {
            if json {
                println!("{}", format_fault_json(&cause));
            }
            eprintln!("{}", fault_text(&cause));
            exit_code_for_fault(&cause)
        }
    }
}

fn cmd_self_check(cfg: &dispense_config::Config, json: bool) -> i32 {
    match self_check(cfg) {
        Ok(pumps) => {
            if json {
                println!("{}", serde_json::json!({ "self_check": "ok", "pumps": pumps }));
            } else {
                println!("self-check ok: {pumps} pumps ready");
            }
            0
        }
        Err(e) => report_failure(&e),
    }
}

/// Missing file is not an error: every table has defaults.
fn load_config(path: &Path) -> eyre::Result<dispense_config::Config> {
    if !path.exists() {
        return Ok(dispense_config::Config::default());
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = dispense_config::load_toml(&text).wrap_err("parse config TOML")?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console layer on stderr (pretty or JSON per --json) plus an optional JSON
/// file layer from [logging]. stdout stays reserved for run output.
fn init_logging(cli: &Cli, logging: &dispense_config::Logging) {
    use tracing_subscriber::{
        EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    };

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = logging.file.as_ref().map(|path| {
        let path = Path::new(path);
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = path.file_name().unwrap_or_else(|| OsStr::new("dispense.log"));
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::new(logging.level.as_deref().unwrap_or("debug"));
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(file_filter)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .init();
}

fn report_failure(err: &eyre::Report) -> i32 {
    if JSON_MODE.get().copied().unwrap_or(false) {
        println!("{}", format_error_json(err));
    }
    eprintln!("{}", humanize(err));
    exit_code_for_error(err)
}
