use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Maps the number of `-v` flags to a default filter directive.
fn directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "cardwriter=info,cardwriter_core=info",
        2 => "cardwriter=debug,cardwriter_core=debug",
        _ => "trace",
    }
}

/// Installs a stderr logger. `RUST_LOG` takes precedence over `-v`.
pub(crate) fn init(verbosity: u8) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(verbosity)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
