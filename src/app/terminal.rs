//! Log level resolution and tracing subscriber setup.

/// Picks the default filter used when `RUST_LOG` is unset.
///
/// Priority: quiet flag > verbose flag > config `log_level` > `info`.
pub(crate) fn resolve_default_log_level(
    quiet: bool,
    verbose: u8,
    config_level: Option<&str>,
) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => config_level.unwrap_or("info").to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `default_level`.
pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}
