use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Installs a formatting subscriber filtered by `RUST_LOG`, or by `default_filter` when unset.
/// Returns `false` when a global subscriber is already installed.
pub fn init(default_filter: &str) -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Like `init`, but writes through the test harness so output is captured per test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sheet_mapper=debug")))
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        init_test_logging();
        assert!(!init("info"));
    }
}
