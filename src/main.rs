//! HelpBot: entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Archive the log if it is already over the size limit
//!   6. Build the LLM provider and shared comms state
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run components (axum channel, optional rotation tick) until shutdown
//!   9. Archive the log once more on the way out

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use helpbot::config::{self, Config};
use helpbot::error::AppError;
use helpbot::llm::providers;
use helpbot::logger;
use helpbot::subsystems::comms::{AxumChannel, CommsState};
use helpbot::subsystems::maintenance::{LogRotator, RotationTick, rotate_logged};
use helpbot::subsystems::runtime::{Component, spawn_components};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();
    let sink = config.log_file.as_deref().map(logger::LogSink::open).transpose()?;
    logger::init(effective_log_level, force_cli_level, sink.clone())?;

    info!(
        bot_name = %config.bot_name,
        base_dir = %config.base_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let rotator = sink.map(|sink| {
        LogRotator::for_sink(sink, &config.paths.archive_dir, config.maintenance.max_log_size_kb)
    });
    if let Some(r) = &rotator {
        rotate_logged(r);
    }

    let llm = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    info!(provider = llm.name(), "llm provider ready");

    let comms = Arc::new(CommsState::new(&config, llm));

    // Ctrl-C cancels this token; every component watches it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let mut components: Vec<Box<dyn Component>> = vec![Box::new(AxumChannel::new(
        "axum0",
        config.comms.axum.bind.clone(),
        comms,
    ))];
    let interval = config.maintenance.check_interval_secs;
    if let Some(r) = rotator.as_ref().filter(|_| interval > 0) {
        components.push(Box::new(RotationTick::new(r.clone(), Duration::from_secs(interval))));
    }

    print_startup_summary(&config);

    let result = spawn_components(components, shutdown.clone()).join().await;
    shutdown.cancel();

    if let Some(r) = &rotator {
        rotate_logged(r);
    }
    info!("shutdown complete");

    result
}

fn print_startup_summary(config: &Config) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let log_line = match &config.log_file {
        Some(p) => format!(
            "{} (archive > {} KB)",
            p.display(),
            config.maintenance.max_log_size_kb
        ),
        None => "stderr".to_string(),
    };

    println!("╔═════════════════════════════════════════════════════════════╗");
    println!("║ {}║", fit(format!("{} ", config.bot_name)));
    println!("╟─────────────────────────────────────────────────────────────╢");
    println!("║ {}║", fit(format!("pid      {}", std::process::id())));
    println!("║ {}║", fit(format!("http     http://{}/", config.comms.axum.bind)));
    println!("║ {}║", fit(format!("docs     {}", config.paths.doc_dir.display())));
    println!("║ {}║", fit(format!("index    {}", config.paths.persist_dir.display())));
    println!("║ {}║", fit(format!("log      {log_line}")));
    println!("║ {}║", fit(format!("llm      {} / {}", config.llm.provider, config.llm.openai.model)));
    println!("╚═════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: helpbot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
