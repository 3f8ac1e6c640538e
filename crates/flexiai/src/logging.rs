use tracing::warn;
use tracing_subscriber::EnvFilter;

use flexiai_config::LoggingConfig;

/// Initialize tracing from the logging section of the config.
///
/// `FLEXIAI_LOG` in the environment overrides the configured level. Safe to
/// call more than once; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env("FLEXIAI_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = match (&config.file_path, config.format.as_str()) {
        (Some(path), format) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let builder = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::sync::Arc::new(file))
                    .with_ansi(false);
                if format == "json" {
                    builder.json().try_init()
                } else {
                    builder.try_init()
                }
            }
            Err(e) => {
                eprintln!("flexiai: cannot open log file {}: {e}", path.display());
                tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new(config.level.clone()))
                    .try_init()
            }
        },
        (None, "json") => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .try_init(),
        (None, _) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    if let Err(e) = result {
        // Another subscriber is already installed; keep it.
        warn!(error = %e, "tracing subscriber already set");
    }
}
