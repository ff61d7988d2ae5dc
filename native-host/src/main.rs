use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use tracing::{Level, debug, error, info};
use utils::logging::{self, Component};

use crate::host::NativeHost;
use crate::youtube::{LookupConfig, YoutubeTranscripts};

mod host;
mod lookup;
mod youtube;

/// Native messaging host that answers `{"video_id": ...}` requests with the
/// video's transcript.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory for the daily rolling log file
    #[arg(long = "log-dir", value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Set log level
    #[arg(long = "log-level", value_name = "LEVEL",
          value_parser = ["trace", "debug", "info", "warn", "error"],
          default_value = "info")]
    log_level: String,

    /// Also write logs to stderr
    #[arg(long = "console-log", action = ArgAction::SetTrue)]
    console_log: bool,

    /// Preferred transcript language, may be repeated
    #[arg(long = "lang", value_name = "CODE", default_value = "en")]
    languages: Vec<String>,

    /// Timeout for each HTTP request made during a lookup
    #[arg(long = "timeout-secs", value_name = "SECS", default_value = "30")]
    timeout_secs: u64,

    /// Parent window handle, passed by Chrome on Windows
    #[arg(long = "parent-window", value_name = "HANDLE", hide = true)]
    parent_window: Option<String>,

    /// Extension origin or manifest path, passed by the browser
    #[arg(hide = true)]
    caller: Vec<String>,
}

impl Cli {
    /// Parses the command line, falling back to defaults when the browser
    /// passes something unexpected. Help and version requests still exit.
    fn parse_lenient() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => {
                eprintln!("Ignoring unrecognized arguments: {}", e);
                Cli::parse_from([env!("CARGO_PKG_NAME")])
            }
        }
    }

    fn max_level(&self) -> Level {
        match self.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            languages: self.languages.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_lenient();

    let mut log_config = logging::get_native_host_config(
        cli.log_dir.clone().unwrap_or_else(logging::default_log_dir),
        cli.max_level(),
    );
    log_config.log_to_console = cli.console_log;

    // Logging is best-effort; the host still serves requests without it.
    match logging::init_logging(log_config) {
        Ok(_) => {
            debug!("Logger initialized for {}", Component::NativeHost.as_str());
        }
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
        }
    }

    log_environment(&cli);

    match run(&cli) {
        Ok(served) => {
            info!("Native host exiting after {} responses", served);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Native host stopped: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<usize> {
    let lookup = YoutubeTranscripts::new(&cli.lookup_config())
        .map_err(|e| anyhow!("Failed to set up transcript lookup: {}", e))?;

    let mut host = NativeHost::new(io::stdin().lock(), io::stdout().lock(), lookup);
    let served = host.run()?;
    Ok(served)
}

fn log_environment(cli: &Cli) {
    info!(
        "Starting {} v{} for {:?}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        cli.caller
    );
    if let Some(handle) = &cli.parent_window {
        debug!("Parent window: {}", handle);
    }
    debug!("Preferred languages: {:?}", cli.languages);
    match std::env::current_exe() {
        Ok(path) => debug!("Executable: {}", path.display()),
        Err(e) => debug!("Executable path unavailable: {}", e),
    }
    if let Ok(dir) = std::env::current_dir() {
        debug!("Working directory: {}", dir.display());
    }
    debug!(
        "System PATH: {}",
        std::env::var("PATH").unwrap_or_default()
    );
}
