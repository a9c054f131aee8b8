//! Logging bootstrap. Handler/session/pool code logs through the `log`
//! facade (matching the teacher's own call sites); `tracing-log` forwards
//! those records into a `tracing-subscriber` so both facades share one sink
//! and one `RUST_LOG`-style filter.

use tracing_subscriber::EnvFilter;

use super::args::LogFormat;

/// Installs the global logger. Must be called exactly once, before any
/// other module logs anything.
pub fn init(log_level: &str, format: LogFormat, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(!no_color);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    tracing_log::LogTracer::init().expect("LogTracer::init must only be called once");
}
