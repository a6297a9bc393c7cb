use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::subscriber::DefaultGuard;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::TrainerError;

/// Per-run log destination: stdout plus `{log_dir}/{flag}.log`.
///
/// Installed as the thread's default subscriber while the sink is alive;
/// dropping it detaches both outputs.
pub struct LogSink {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl LogSink {
    /// Open (truncating) the run's log file and start routing events to it.
    ///
    /// `RUST_LOG` filters stdout only; the file always records `info` and up.
    pub fn open(log_dir: &Path, flag: &str) -> Result<Self, TrainerError> {
        let stdout_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        Self::open_filtered(log_dir, flag, stdout_filter)
    }

    fn open_filtered(
        log_dir: &Path,
        flag: &str,
        stdout_filter: EnvFilter,
    ) -> Result<Self, TrainerError> {
        let path = log_dir.join(format!("{flag}.log"));
        let file = File::create(&path).map_err(|e| TrainerError::LogSink {
            path: path.clone(),
            source: e,
        })?;
        println!("Log file save at: {}", path.display());

        let file = Arc::new(file);
        let file_layer = fmt::layer()
            .with_writer(move || file.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO);
        let stdout_layer = fmt::layer().with_target(false).with_filter(stdout_filter);

        let subscriber = tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer);
        let guard = tracing::subscriber::set_default(subscriber);

        Ok(LogSink {
            path,
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether an `info` event would be recorded by the current subscriber.
pub fn info_enabled() -> bool {
    tracing::enabled!(Level::INFO)
}

/// Log `msg` at `info`, or print it when no subscriber would record it.
pub fn notice(msg: &str) {
    if info_enabled() {
        info!("{msg}");
    } else {
        println!("{msg}");
    }
}
