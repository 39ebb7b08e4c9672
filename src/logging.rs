//! Structured logging.
//!
//! JSON lines on stdout, and additionally in a rotating file when `logPath`
//! is configured. The level comes from `RUST_LOG` (default `info`).

use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{Config, LogRotation};
use crate::error::Error;
use crate::version::Version;

/// Builds and installs the process-wide subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for as long as the process logs. If a global subscriber is already
/// installed (tests, or a second call) it is kept and this only logs the
/// version line.
pub fn init(config: &Config, version: &Version) -> Result<Option<WorkerGuard>, Error> {
    let (file_layer, guard) = match &config.log_path {
        Some(path) => {
            let appender = rolling_appender(path, config.log_rotation, config.log_max_files)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .with(file_layer)
        .try_init();
    if let Err(e) = installed {
        tracing::debug!("keeping existing subscriber: {e}");
    }

    info!(checksum = %version.checksum, date_time = %version.date_time, "kvgate");
    Ok(guard)
}

/// `/var/log/kvgate.log` rolls as `/var/log/kvgate.<date>.log`.
fn rolling_appender(
    path: &Path,
    rotation: LogRotation,
    max_files: usize,
) -> Result<RollingFileAppender, InitError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = path.file_stem().and_then(|s| s.to_str()).unwrap_or("kvgate");

    let mut builder = RollingFileAppender::builder()
        .rotation(match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        })
        .filename_prefix(prefix)
        .max_log_files(max_files);
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        builder = builder.filename_suffix(ext);
    }
    builder.build(dir)
}
