use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bbmirror::config::LoggingConfig;
use bbmirror::output::Palette;
use bbmirror::runner::{self, RunOptions};
use bbmirror::session::DialoguerPrompter;
use bbmirror::SetupError;

#[derive(Parser)]
#[command(name = "bbmirror")]
#[command(about = "Clone or update every repository of a Bitbucket workspace")]
#[command(version)]
struct Cli {
    /// Prompt for credentials, workspace and destination instead of reading the config file
    #[arg(short, long)]
    interactive: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Polled first so the SIGINT handler exists before the first prompt
    let code = tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted");
            0
        }
        code = run_cli(cli) => code,
    };

    std::process::exit(code);
}

/// Run once and map the result to a process exit status
async fn run_cli(cli: Cli) -> i32 {
    let config = runner::load_config(cli.config.as_deref(), cli.interactive);

    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = init_logging(&logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let palette = Palette::new(logging.color);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            println!("{}", palette.warn(&format!("{:#}", e)));
            return 1;
        }
    };

    info!("Starting bbmirror v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config.git);

    let options = RunOptions {
        interactive: cli.interactive,
        palette,
    };
    let mut prompter = DialoguerPrompter::default();

    match runner::run(&config, &options, &mut prompter, &mut io::stdout()).await {
        Ok(_) => 0,
        Err(e) if is_interrupt(&e) => {
            println!("Interrupted");
            0
        }
        Err(e) => {
            println!("{}", palette.warn(&format!("{:#}", e)));
            1
        }
    }
}

fn is_interrupt(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SetupError>()
        .is_some_and(SetupError::is_interrupted)
}

/// Initialize logging to stderr; `RUST_LOG` overrides the configured level
fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(logging.color),
        )
        .with(filter)
        .try_init()?;

    Ok(())
}
