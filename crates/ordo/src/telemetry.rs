//! Subscriber setup for processes embedding a registry.
//!
//! Filter directives come from `ORDO_LOG`, then `logging.filter`, then a
//! default derived from verbosity that keeps ordo's own targets one step
//! louder than everything else. Lane tasks run inside a `lane` span and
//! batches inside a `batch` span carrying the context, so the JSON and tree
//! formats show which lane and context an event came from.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};

pub const ENV_LOG: &str = "ORDO_LOG";
pub const LOG_FILE_PREFIX: &str = "ordo.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

/// Keeps the file writer flushing. Drop it after the registry.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// Where the active filter directives came from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FilterSource {
    Env(String),
    Configured(String),
    Verbosity(u8),
}

impl FilterSource {
    fn resolve(env: Option<String>, configured: Option<&str>, verbosity: u8) -> Self {
        let env = env.filter(|raw| !raw.trim().is_empty());
        let configured = configured.filter(|raw| !raw.trim().is_empty());
        match (env, configured) {
            (Some(env), _) => FilterSource::Env(env),
            (None, Some(configured)) => FilterSource::Configured(configured.to_string()),
            (None, None) => FilterSource::Verbosity(verbosity),
        }
    }

    fn directives(&self) -> &str {
        match self {
            FilterSource::Env(raw) | FilterSource::Configured(raw) => raw,
            FilterSource::Verbosity(verbosity) => default_directives(*verbosity),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FilterSource::Env(_) => "env",
            FilterSource::Configured(_) => "config",
            FilterSource::Verbosity(_) => "verbosity",
        }
    }

    fn build(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .parse_lossy(self.directives())
    }
}

/// Coordinator start and stop are `info`; per-ticket detail is `trace`.
fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,ordo=info",
        1 => "info",
        2 => "info,ordo=debug",
        _ => "debug,ordo=trace",
    }
}

/// Install the global subscriber.
///
/// A second call keeps the first subscriber and logs a warning.
pub fn init(config: TelemetryConfig) -> TelemetryGuard {
    let source = FilterSource::resolve(
        std::env::var(ENV_LOG).ok(),
        config.logging.filter.as_deref(),
        config.verbosity,
    );

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.logging.stdout {
        layers.push(format_layer(config.logging.stdout_format, std::io::stderr, true));
    }

    let mut file_guard = None;
    let mut deferred: Vec<String> = Vec::new();
    let mut pruned = None;
    let file = &config.logging.file;
    if file.enabled {
        let dir = file.dir.clone().unwrap_or_else(crate::paths::log_dir);
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                let retention = LogRetention::from_config(file);
                if retention.is_enabled() {
                    match retention.prune(&dir, SystemTime::now()) {
                        Ok(report) => pruned = Some(report),
                        Err(err) => deferred.push(format!("log retention failed: {err}")),
                    }
                }
                let appender =
                    RollingFileAppender::new(rotation(file.rotation), &dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                layers.push(format_layer(file.format, writer, false));
                file_guard = Some(guard);
            }
            Err(err) => {
                deferred.push(format!("cannot create log dir {}: {err}", dir.display()));
            }
        }
    }

    layers.push(Box::new(source.build()));
    if let Err(err) = Registry::default().with(layers).try_init() {
        tracing::warn!("telemetry already initialized: {err}");
    }

    tracing::debug!(
        filter = source.directives(),
        source = source.kind(),
        "telemetry initialized"
    );
    if let Some(report) = pruned {
        tracing::info!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "old log files pruned"
        );
    }
    for message in deferred {
        tracing::warn!("{message}");
    }

    TelemetryGuard { _file: file_guard }
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Tree => Box::new(
            tracing_tree::HierarchicalLayer::new(2)
                .with_writer(writer)
                .with_ansi(ansi)
                .with_targets(true),
        ),
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_thread_names(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_thread_names(true)
                .with_current_span(true)
                .with_span_list(true),
        ),
    }
}

/// Limits on the rotated files kept in the log dir.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LogRetention {
    max_age: Option<Duration>,
    max_files: Option<usize>,
}

#[derive(Clone, Debug)]
struct LogFile {
    path: PathBuf,
    modified: SystemTime,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PruneReport {
    scanned: usize,
    removed: usize,
    failed: usize,
}

impl LogRetention {
    fn from_config(config: &FileLoggingConfig) -> Self {
        Self {
            max_age: config
                .retention_max_age_days
                .map(|days| Duration::from_secs(days.saturating_mul(86_400))),
            max_files: config.retention_max_files,
        }
    }

    fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_files.is_some()
    }

    /// Files to delete, oldest first: anything past `max_age`, and anything
    /// outside the newest `max_files`.
    fn expired(&self, mut files: Vec<LogFile>, now: SystemTime) -> Vec<PathBuf> {
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        let mut expired: Vec<PathBuf> = files
            .into_iter()
            .enumerate()
            .filter(|(rank, file)| {
                let age = now.duration_since(file.modified).unwrap_or_default();
                self.max_age.is_some_and(|max| age > max)
                    || self.max_files.is_some_and(|max| *rank >= max)
            })
            .map(|(_, file)| file.path)
            .collect();
        expired.reverse();
        expired
    }

    fn prune(&self, dir: &Path, now: SystemTime) -> std::io::Result<PruneReport> {
        let files = log_files(dir, now)?;
        let mut report = PruneReport {
            scanned: files.len(),
            ..PruneReport::default()
        };
        for path in self.expired(files, now) {
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }
}

/// Regular files in `dir` written by the file layer.
fn log_files(dir: &Path, now: SystemTime) -> std::io::Result<Vec<LogFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        let meta = entry.metadata()?;
        if ours && meta.is_file() {
            files.push(LogFile {
                path: entry.path(),
                modified: meta.modified().unwrap_or(now),
            });
        }
    }
    Ok(files)
}
