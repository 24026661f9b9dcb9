//! Binary entry point for `mirk`.
//!
//! This module provides the command-line interface for mirk with options
//! for configuration file paths and logging verbosity. It initializes
//! logging, loads configuration, runs the relay, and maps failures onto
//! distinct exit statuses.

use std::process::ExitCode;

use clap::Parser;
use mirk::base::{
    config::Config,
    types::{ExitStatus, Void},
};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing::error;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Mirk – relays archive and build events into Matrix rooms.
///
/// Configuration can come from `config.toml` or environment variables.
/// The relay subscribes to the event bus, renders every event into a short
/// HTML message, and posts it to each configured room.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, mirk will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Export spans to an OTLP collector over HTTP.
    ///
    /// The collector endpoint is taken from the standard
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` environment variable.
    #[arg(long)]
    otlp: bool,
}

/// Main entry point for the mirk binary.
///
/// Sets up logging based on verbosity, loads configuration, and starts the relay.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_tracing(&args) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitStatus::Config.into();
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {:#}", err);
            return ExitStatus::Config.into();
        }
    };

    match mirk::start(config).await {
        Ok(()) => ExitStatus::Success.into(),
        Err(err) => {
            let status = ExitStatus::of(&err);
            error!("{:#}", err);
            error!("Exiting with status {} ({:?}).", status.code(), status);
            status.into()
        }
    }
}

fn init_tracing(args: &Args) -> Void {
    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer, if asked for.

    let otel = if args.otlp {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("mirk");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).try_init()?;

    Ok(())
}
