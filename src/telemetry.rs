use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Install the global JSON subscriber. `RUST_LOG` overrides the default filter.
///
/// Records emitted through the `log` facade are bridged into the same stream.
pub fn init_telemetry() {
    let env_filter = build_filter(std::env::var("RUST_LOG").ok().as_deref());

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    // A second initialisation (tests) is a no-op instead of a panic.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init();
}

fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
