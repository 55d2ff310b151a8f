// ABOUTME: Shared logging setup for the nomad binaries
// ABOUTME: Logs to stderr so stdout stays clean for the payload and QR output

use tracing_subscriber::EnvFilter;

/// Crates whose events are shown at the base level. Everything else is WARN.
const NOMAD_CRATES: &[&str] = &["nomad_setup", "nomad_ssh"];

/// Standard logging to stderr. Default: INFO for nomad crates, WARN otherwise.
/// RUST_LOG directives are applied on top.
pub fn init() {
    init_at(tracing::Level::INFO);
}

/// Verbose logging to stderr. Default: DEBUG for nomad crates, WARN otherwise.
pub fn init_verbose() {
    init_at(tracing::Level::DEBUG);
}

fn init_at(level: tracing::Level) {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_filter(level: tracing::Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    for name in NOMAD_CRATES {
        let directive = format!("{name}={}", level.as_str().to_ascii_lowercase());
        filter = filter.add_directive(directive.parse().unwrap_or_else(|_| level.into()));
    }
    filter
}
