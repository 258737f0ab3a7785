use std::borrow::Cow;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, SpanRef, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};

/// An open span that is ended exactly once: explicitly, or when dropped.
///
/// The span lives inside an OpenTelemetry [`Context`], so children can be
/// parented on [`SpanScope::context`] and the context can be propagated.
#[derive(Debug)]
pub struct SpanScope {
    cx: Context,
    ended: bool,
}

impl SpanScope {
    pub fn start(
        tracer: &BoxedTracer,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> Self {
        let builder = tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes);
        let span = tracer.build_with_context(builder, parent);
        Self {
            cx: parent.with_span(span),
            ended: false,
        }
    }

    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span(&self) -> SpanRef<'_> {
        self.cx.span()
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn end_ok(mut self) {
        self.cx.span().set_status(Status::Ok);
        self.finish();
    }

    pub fn end_error(mut self, description: impl Into<Cow<'static, str>>) {
        let description = description.into();
        let span = self.cx.span();
        span.add_event(
            "exception",
            vec![KeyValue::new("exception.message", description.to_string())],
        );
        span.set_status(Status::error(description));
        self.finish();
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.ended {
            self.ended = true;
            self.cx.span().end();
        }
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        self.finish();
    }
}
