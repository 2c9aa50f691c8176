// Logger initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "scholar_agent=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Output goes to stderr so the
/// rendered replies on stdout stay clean. Calling this twice is a no-op.
pub fn init_logger() {
    let _ = tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_is_idempotent() {
        init_logger();
        init_logger();
        tracing::info!("logger initialized");
    }
}
