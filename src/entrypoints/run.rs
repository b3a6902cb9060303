use super::cli::parse_args;
use super::metadata::log_version_info;
use crate::app::{self, settings::Settings};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Setup logging, with `RUST_LOG` overriding the default level
fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // Profiling scopes are emitted as spans, log their timings on close
    #[cfg(feature = "profiling")]
    let builder = builder.with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE);
    builder.init();
}

/// Native entry point
pub fn native_main() -> ExitCode {
    let settings = match parse_args::<Settings>() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };
    init_logging(settings.quiet);
    log_version_info();

    match app::run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
