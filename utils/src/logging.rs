use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const NOISY_DEPS: [&str; 3] = ["hyper_util", "reqwest", "mio"];

pub enum Component {
    NativeHost,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::NativeHost => "native_host",
        }
    }

    /// Prefix of the daily log file; the appender adds `.YYYY-MM-DD`.
    pub fn file_name(&self) -> String {
        format!("{}.log", self.as_str())
    }
}

pub struct LogConfig {
    pub component: Component,
    pub log_dir: PathBuf,
    pub max_level: Level,
    /// Mirror events to stderr. Stdout carries protocol frames and is never
    /// a log target.
    pub log_to_console: bool,
}

/// `<temp dir>/yt-transcript-host`, writable without any installer setup.
pub fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("yt-transcript-host")
}

/// Installs the global subscriber once. Later calls are no-ops.
///
/// Every failure, including a log file that cannot be opened, comes back as
/// `Err` so the caller can keep running without logs.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut result = Ok(());

    INIT.call_once(|| {
        result = initialize_logging_internal(config);
    });

    result
}

fn initialize_logging_internal(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = open_appender(&config.component, &config.log_dir)?;

    let mut layers = Vec::new();

    if config.log_to_console {
        let stderr_layer = fmt::Layer::new()
            .with_ansi(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact();
        layers.push(stderr_layer.with_filter(build_filter(&config)?).boxed());
    }

    let file_layer = fmt::Layer::new()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_target(true);
    layers.push(file_layer.with_filter(build_filter(&config)?).boxed());

    tracing_subscriber::registry().with(layers).try_init()?;

    Ok(())
}

fn open_appender(
    component: &Component,
    log_dir: &Path,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(component.file_name())
        .build(log_dir)?;
    Ok(appender)
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    let level = config.max_level;
    let mut filter = EnvFilter::try_new(level.as_str())?
        .add_directive(format!("{}={}", config.component.as_str(), level).parse()?);

    for dep in NOISY_DEPS {
        filter = filter.add_directive(format!("{}=error", dep).parse()?);
    }

    Ok(filter)
}

/// Logging setup for the native messaging host.
pub fn get_native_host_config(log_dir: impl Into<PathBuf>, max_level: Level) -> LogConfig {
    LogConfig {
        component: Component::NativeHost,
        log_dir: log_dir.into(),
        max_level,
        log_to_console: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_host_config_defaults() {
        let config = get_native_host_config("/tmp/logs", Level::DEBUG);
        assert_eq!(config.max_level, Level::DEBUG);
        assert!(!config.log_to_console);
        assert_eq!(config.component.file_name(), "native_host.log");
    }

    #[test]
    fn filter_silences_http_stack() {
        let config = get_native_host_config("/tmp/logs", Level::WARN);
        let rendered = build_filter(&config).unwrap().to_string().to_lowercase();
        assert!(rendered.contains("native_host=warn"));
        assert!(rendered.contains("reqwest=error"));
        assert!(rendered.contains("hyper_util=error"));
    }

    // Exercises the setup path without installing a global subscriber: the
    // failure happens before `try_init`.
    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let today = chrono::Utc::now().format("%Y-%m-%d");
        std::fs::create_dir(dir.path().join(format!("native_host.log.{}", today))).unwrap();

        let result = initialize_logging_internal(get_native_host_config(dir.path(), Level::INFO));
        assert!(result.is_err());
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        init_logging(get_native_host_config(&log_dir, Level::INFO)).unwrap();
        assert!(log_dir.is_dir());
    }
}
