use dotenvy::dotenv;
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod open_telemetry;
use open_telemetry::init_otel_layer;

const DEFAULT_FILTER: &str = "info";

fn init_env_layer() -> tracing_subscriber::EnvFilter {
    // should run before reading RUST_LOG so the value in .env is honored
    match dotenv() {
        Ok(path) => eprintln!(".env read successfully from {}", path.display()),
        Err(e) => eprintln!("Could not load .env file: {e}"),
    };

    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber, printing to stdout.
///
/// Spans are additionally exported over OTLP when
/// `OPENTELEMETRY_OTLP_GRPC_ENDPOINT` is set.
pub fn init_tracing_to_stdout(service_name: &str) {
    let env_layer = init_env_layer();

    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(true);

    let telemetry_layer = init_otel_layer(service_name);

    tracing_subscriber::registry()
        .with(env_layer)
        .with(stdout_layer)
        .with(telemetry_layer)
        .init();
}

/// Same as [`init_tracing_to_stdout`] but appends to `<log_dir>/app.log`.
/// Falls back to stdout if the file cannot be opened.
pub fn init_tracing_to_file(service_name: &str, log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref();

    let file_log_layer = {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Failed to create log dir: {}", e);
            init_tracing_to_stdout(service_name); // fallback to stdout tracing
            return;
        }
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("app.log"))
        {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Failed to open log file: {}", e);
                init_tracing_to_stdout(service_name); // fallback to stdout tracing
                return;
            }
        };
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    };

    let env_layer = init_env_layer();
    let telemetry_layer = init_otel_layer(service_name);

    tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .with(telemetry_layer)
        .init();
}
