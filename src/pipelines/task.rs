use std::borrow::Cow;
use std::fmt::Display;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::SpanKind;
use opentelemetry::{Context, KeyValue};

use super::span_scope::SpanScope;
use crate::semconv::TASK_DECORATED_FUNCTION;

/// A named unit of application work traced as its own span.
///
/// Interactions started while the task runs are parented on it.
#[derive(Debug, Clone)]
pub struct Task {
    name: Cow<'static, str>,
    attributes: Vec<KeyValue>,
}

impl Task {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        Self {
            attributes: vec![KeyValue::new(TASK_DECORATED_FUNCTION, name.to_string())],
            name,
        }
    }

    /// Static metadata copied onto the span.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .push(KeyValue::new(key.into(), value.into()));
        self
    }

    /// An argument of the traced function, recorded under its parameter name.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.attributes
            .push(KeyValue::new(name.into(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn start(self, tracer: &BoxedTracer, parent: &Context) -> SpanScope {
        SpanScope::start(tracer, self.name, SpanKind::Internal, self.attributes, parent)
    }
}
