use tracing_subscriber::{prelude::*, util::TryInitError, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` selects what is logged; the
/// segment proof and conglomeration spans are logged at `info`.
pub fn init() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
}
