use opentelemetry::trace::SpanRef;
use opentelemetry::{Array, KeyValue, StringValue, Value};
use serde_json::{Map, Value as JsonValue};

use super::types::{EvaluationResult, ValidationFailure};

pub const LANGKIT_METRICS_PREFIX: &str = "langkit.metrics";
pub const LANGKIT_METRICS_POLICY: &str = "langkit.metrics.policy";
pub const LANGKIT_INSIGHTS_TAGS: &str = "langkit.insights.tags";
pub const GUARDRAILS_API_PREFIX: &str = "guardrails.api";
pub const GUARDRAILS_ERROR: &str = "guardrails.error";
pub const GUARDRAILS_BLOCKED: &str = "guardrails.blocked";
pub const VALIDATION_FAILURE_EVENT: &str = "guardrails.api.validation_failure";
pub const BLOCKED_TAG: &str = "BLOCKED";

const PROMPT_SCORE_PREFIX: &str = "prompt.score.";
const RESPONSE_SCORE_PREFIX: &str = "response.score.";
const REDACTED_SUFFIX: &str = ".redacted";

/// `response.score.toxicity` -> `toxicity`
pub fn strip_score_prefix(metric: &str) -> &str {
    metric
        .strip_prefix(RESPONSE_SCORE_PREFIX)
        .or_else(|| metric.strip_prefix(PROMPT_SCORE_PREFIX))
        .unwrap_or(metric)
}

/// Converts a JSON value into an attribute value. Nulls and empty arrays have
/// no attribute representation.
pub fn json_to_otel_value(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::I64)
            .or_else(|| n.as_f64().map(Value::F64)),
        JsonValue::String(s) => Some(Value::String(s.clone().into())),
        JsonValue::Array(items) => json_array_to_otel(items),
        JsonValue::Object(_) => Some(Value::String(value.to_string().into())),
    }
}

fn json_array_to_otel(items: &[JsonValue]) -> Option<Value> {
    if items.is_empty() {
        return None;
    }
    if let Some(bools) = items.iter().map(JsonValue::as_bool).collect::<Option<Vec<_>>>() {
        return Some(Value::Array(Array::Bool(bools)));
    }
    if let Some(ints) = items.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>() {
        return Some(Value::Array(Array::I64(ints)));
    }
    if let Some(floats) = items.iter().map(JsonValue::as_f64).collect::<Option<Vec<_>>>() {
        return Some(Value::Array(Array::F64(floats)));
    }
    let strings = items
        .iter()
        .map(|item| match item {
            JsonValue::String(s) => StringValue::from(s.clone()),
            other => StringValue::from(other.to_string()),
        })
        .collect();
    Some(Value::Array(Array::String(strings)))
}

fn string_array<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(Array::String(
        items
            .into_iter()
            .map(|s| StringValue::from(s.into()))
            .collect(),
    ))
}

fn record_metric_map(span: &SpanRef<'_>, map: &Map<String, JsonValue>, strip_prefix: bool) {
    for (key, value) in map {
        if key.ends_with(REDACTED_SUFFIX) {
            continue;
        }
        let Some(value) = json_to_otel_value(value) else {
            continue;
        };
        let name = if strip_prefix {
            strip_score_prefix(key)
        } else {
            key.as_str()
        };
        span.set_attribute(KeyValue::new(format!("{LANGKIT_METRICS_PREFIX}.{name}"), value));
    }
}

/// Copies metrics, scores, metadata and insight tags onto a guardrail span,
/// and emits one event per validation failure.
pub fn record_evaluation(span: &SpanRef<'_>, result: &EvaluationResult) {
    if let Some(metrics) = result.metrics.first() {
        record_metric_map(span, metrics, false);
    }
    if let Some(scores) = result.scores.first() {
        record_metric_map(span, scores, true);
    }
    for (key, value) in &result.metadata {
        if let Some(value) = json_to_otel_value(value) {
            span.set_attribute(KeyValue::new(format!("{GUARDRAILS_API_PREFIX}.{key}"), value));
        }
    }

    let mut tags: Vec<String> = Vec::new();
    if result.is_blocked() {
        tags.push(BLOCKED_TAG.to_string());
    }
    tags.extend(
        result
            .failures()
            .iter()
            .filter_map(|failure| failure.metric.as_deref())
            .map(|metric| strip_score_prefix(metric).to_string()),
    );
    if !tags.is_empty() {
        span.set_attribute(KeyValue::new(LANGKIT_INSIGHTS_TAGS, string_array(tags)));
    }

    record_validation_failures(span, result.failures(), &result.metadata);
}

pub fn record_validation_failures(
    span: &SpanRef<'_>,
    report: &[ValidationFailure],
    metadata: &Map<String, JsonValue>,
) {
    let policy = metadata.get("policy_id").and_then(json_to_otel_value);
    for failure in report {
        span.add_event(VALIDATION_FAILURE_EVENT, validation_event_attributes(failure, policy.clone()));
    }
}

pub(crate) fn validation_event_attributes(
    failure: &ValidationFailure,
    policy: Option<Value>,
) -> Vec<KeyValue> {
    let metric = failure.metric.clone().unwrap_or_default();
    let mut attributes = Vec::with_capacity(12);
    if let Some(policy) = policy {
        attributes.push(KeyValue::new(LANGKIT_METRICS_POLICY, policy));
    }
    attributes.push(KeyValue::new("rule_id", strip_score_prefix(&metric).to_string()));
    if let Some(details) = &failure.details {
        attributes.push(KeyValue::new("explanation", details.clone()));
    }
    if let Some(id) = &failure.id {
        attributes.push(KeyValue::new("id", id.clone()));
    }
    attributes.push(KeyValue::new("metrics", string_array([metric])));
    if let Some(level) = &failure.failure_level {
        attributes.push(KeyValue::new("action", string_array([level.clone()])));
    }
    if let Some(allowed) = &failure.allowed_values {
        attributes.push(KeyValue::new(
            "allowed_values",
            JsonValue::Array(allowed.clone()).to_string(),
        ));
    }
    if let Some(lower) = failure.lower_threshold {
        attributes.push(KeyValue::new("lower_threshold", lower));
    }
    if let Some(flag) = failure.must_be_non_none {
        attributes.push(KeyValue::new("must_be_non_none", flag));
    }
    if let Some(flag) = failure.must_be_none {
        attributes.push(KeyValue::new("must_be_none", flag));
    }
    if let Some(upper) = failure.upper_threshold {
        attributes.push(KeyValue::new("upper_threshold", upper));
    }
    if let Some(value) = failure.value.as_ref().and_then(json_to_otel_value) {
        attributes.push(KeyValue::new("metric_value", value));
    }
    attributes
}

pub fn record_guardrail_error(span: &SpanRef<'_>) {
    span.set_attribute(KeyValue::new(GUARDRAILS_ERROR, 1_i64));
}
