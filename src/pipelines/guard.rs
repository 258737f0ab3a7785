use std::sync::Arc;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::SpanKind;
use opentelemetry::{Context, KeyValue};

use super::span_scope::SpanScope;
use crate::guardrails::providers::GuardrailClient;
use crate::guardrails::span_attributes::record_evaluation;
use crate::guardrails::types::{EvaluationResult, GuardInput, GuardPhase};
use crate::semconv::{SPAN_TYPE, SPAN_TYPE_GUARDRAILS};

/// One guardrail evaluation wrapped in its own child span.
#[derive(Clone)]
pub struct GuardStep {
    tracer: Arc<BoxedTracer>,
    client: Arc<dyn GuardrailClient>,
}

impl GuardStep {
    pub fn new(tracer: Arc<BoxedTracer>, client: Arc<dyn GuardrailClient>) -> Self {
        Self { tracer, client }
    }

    fn open(&self, phase: GuardPhase, parent: &Context) -> SpanScope {
        SpanScope::start(
            &self.tracer,
            phase.span_name(),
            SpanKind::Client,
            vec![KeyValue::new(SPAN_TYPE, SPAN_TYPE_GUARDRAILS)],
            parent,
        )
    }

    fn close(scope: SpanScope, result: Option<&EvaluationResult>) {
        if let Some(result) = result {
            record_evaluation(&scope.span(), result);
        }
        scope.end();
    }

    pub async fn check(&self, input: GuardInput<'_>, parent: &Context) -> Option<EvaluationResult> {
        let scope = self.open(input.phase(), parent);
        let result = self.client.evaluate(input, scope.context()).await;
        Self::close(scope, result.as_ref());
        result
    }

    pub fn check_blocking(&self, input: GuardInput<'_>, parent: &Context) -> Option<EvaluationResult> {
        let scope = self.open(input.phase(), parent);
        let result = self.client.evaluate_blocking(input, scope.context());
        Self::close(scope, result.as_ref());
        result
    }
}
