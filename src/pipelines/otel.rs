use std::collections::HashMap;

use opentelemetry::trace::{SpanRef, TraceError};
use opentelemetry::{Key, KeyValue, Value, global};
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::export::trace::SpanExporter as ExportSpans;
use opentelemetry_sdk::trace::{Builder, Config, TracerProvider};
use opentelemetry_sdk::{Resource, runtime};
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::config::validation::ExportCredentials;
use super::debug_exporter::DebugSpanExporter;
use crate::semconv::{completion_attribute, prompt_attribute};

const API_KEY_HEADER: &str = "X-API-Key";
const RESOURCE_HEADER: &str = "X-WHYLABS-RESOURCE";

/// Vendor payloads that know how to describe themselves on a span.
///
/// Prompt and completion text is only written when `trace_content` is set.
pub trait RecordSpan {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool);
}

/// Sets `key` unless the value is absent or an empty string.
pub fn set_span_attribute<V: Into<Value>>(span: &SpanRef<'_>, key: impl Into<Key>, value: Option<V>) {
    let Some(value) = value else {
        return;
    };
    let value = value.into();
    if let Value::String(s) = &value {
        if s.as_str().is_empty() {
            return;
        }
    }
    span.set_attribute(KeyValue::new(key, value));
}

/// Integer attribute from any unsigned counter the vendor reports.
pub fn set_count_attribute<N: TryInto<i64>>(span: &SpanRef<'_>, key: &'static str, value: Option<N>) {
    set_span_attribute(span, key, value.and_then(|n| n.try_into().ok()));
}

pub fn set_prompt(span: &SpanRef<'_>, index: usize, role: &str, content: Option<&str>) {
    set_span_attribute(span, prompt_attribute(index, "role"), Some(role.to_string()));
    set_span_attribute(span, prompt_attribute(index, "content"), content.map(str::to_string));
}

pub fn set_completion(
    span: &SpanRef<'_>,
    index: usize,
    role: Option<&str>,
    content: Option<&str>,
    finish_reason: Option<&str>,
) {
    set_span_attribute(span, completion_attribute(index, "role"), role.map(str::to_string));
    set_span_attribute(span, completion_attribute(index, "content"), content.map(str::to_string));
    set_span_attribute(
        span,
        completion_attribute(index, "finish_reason"),
        finish_reason.map(str::to_string),
    );
}

/// Builds and installs the global OTLP/HTTP tracer provider.
///
/// Batches on the current Tokio runtime unless `disable_batching` is set or
/// there is no runtime, in which case each span is exported as it ends.
pub fn init_tracer_provider(
    config: &TelemetryConfig,
    credentials: &ExportCredentials,
) -> Result<TracerProvider, TraceError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let endpoint = config.traces_endpoint();
    let mut headers = HashMap::new();
    headers.insert(API_KEY_HEADER.to_string(), credentials.api_key.clone());
    headers.insert(RESOURCE_HEADER.to_string(), credentials.dataset_id.clone());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name().to_string()),
        KeyValue::new("application.name", config.application_name().to_string()),
        KeyValue::new("version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("resource.id", credentials.dataset_id.clone()),
    ]);

    let builder = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .with_headers(headers);
    let in_runtime = tokio::runtime::Handle::try_current().is_ok();
    let exporter = if in_runtime {
        builder.with_http_client(reqwest::Client::new()).build()?
    } else {
        builder
            .with_http_client(reqwest::blocking::Client::new())
            .build()?
    };

    let batch = in_runtime && !config.disable_batching;
    #[allow(deprecated)]
    let provider_builder =
        TracerProvider::builder().with_config(Config::default().with_resource(resource));
    let provider = if config.debug_export {
        debug!("Span export debugging enabled");
        build_provider(provider_builder, DebugSpanExporter::new(exporter), batch)
    } else {
        build_provider(provider_builder, exporter, batch)
    };

    global::set_tracer_provider(provider.clone());
    info!(
        endpoint = %endpoint,
        dataset_id = %credentials.dataset_id,
        batch,
        debug_export = config.debug_export,
        "OpenTelemetry tracer initialized"
    );
    Ok(provider)
}

fn build_provider<E: ExportSpans + 'static>(builder: Builder, exporter: E, batch: bool) -> TracerProvider {
    if batch {
        debug!("Using batch span exporter");
        builder.with_batch_exporter(exporter, runtime::Tokio).build()
    } else {
        debug!("Using simple span exporter");
        builder.with_simple_exporter(exporter).build()
    }
}
