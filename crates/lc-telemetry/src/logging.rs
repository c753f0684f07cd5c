use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Human
        }
    }
}

fn filter_for(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber in the requested format.
///
/// `RUST_LOG` wins over `default_level` (e.g. "info", "lc_agents=debug,warn").
/// Returns `false` when a subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) -> bool {
    let builder = fmt()
        .with_env_filter(filter_for(default_level))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    let installed = match format {
        LogFormat::Human => builder.with_thread_ids(false).try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };

    if installed {
        tracing::info!(service = service_name, format = ?format, "logging initialised");
    }
    installed
}

/// Human-readable output. Safe to call multiple times.
pub fn init_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Human);
}

/// JSON output for log shippers. Safe to call multiple times.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Json);
}
