use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.telemetry().log_level.clone()))
}

/// Subscriber for the long-running API process. Span close events carry the
/// per-request and per-session timings.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let builder = fmt().with_env_filter(env_filter(settings)).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "Tracing initialised"
    );
    Ok(())
}

/// Subscriber for one-shot operator commands: stderr only, so stdout stays a
/// clean report.
pub(crate) fn init_cli_tracing(settings: &Settings) -> anyhow::Result<()> {
    fmt()
        .with_env_filter(env_filter(settings))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))
}
