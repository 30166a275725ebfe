use color_eyre::eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `EnvFilter` directives.
pub const LOG_ENV: &str = "SYSDECK_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the global stderr subscriber. Stdout stays reserved for command
/// output.
pub fn init(json: bool) -> Result<()> {
    let filter = filter_from(std::env::var(LOG_ENV).ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.with_ansi(false).json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
