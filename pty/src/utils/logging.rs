use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use xsh_core::LogConfig;

/// Installs the global subscriber writing to the log file.
///
/// The terminal belongs to the wrapped shell, so nothing is ever logged to
/// stdout or stderr. When the file cannot be opened logging stays disabled.
pub fn init(config: &LogConfig) {
    let path = config.file_path();
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
