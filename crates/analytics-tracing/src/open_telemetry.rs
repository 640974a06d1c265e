use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_opentelemetry::OpenTelemetryLayer;

/// OTLP layer, only built when `OPENTELEMETRY_OTLP_GRPC_ENDPOINT` is set.
///
/// Must be called inside a tokio runtime, the batch exporter spawns on it.
pub(crate) fn init_otel_layer<S>(
    service_name: &str,
) -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let endpoint = std::env::var("OPENTELEMETRY_OTLP_GRPC_ENDPOINT").ok()?;

    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let otlp_config = sdktrace::config().with_resource(Resource::new(vec![
        opentelemetry::KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            service_name.to_string(),
        ),
    ]));

    match opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .with_trace_config(otlp_config)
        .install_batch(runtime::Tokio)
    {
        Ok(tracer) => Some(tracing_opentelemetry::layer::<S>().with_tracer(tracer)),
        Err(e) => {
            eprintln!("Failed to create OpenTelemetry tracer with otlp exporter: {}", e);
            None
        }
    }
}
