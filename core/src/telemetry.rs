// Logging setup shared by the gateway and the uploader
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber
///
/// The filter comes from `RUST_LOG` when set, otherwise from `default_filter`
/// (e.g. `"info,docview_core=info"`). Returns an error instead of panicking
/// when a global subscriber is already installed, so tests and embedding
/// applications can call it freely.
///
/// # Example
///
/// ```no_run
/// use docview_core::telemetry::init_logging;
///
/// init_logging("info,docview_core=debug").ok();
/// ```
pub fn init_logging(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    info!(target: "telemetry", filter = %default_filter, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_logging("warn");
        assert!(init_logging("warn").is_err());
    }
}
