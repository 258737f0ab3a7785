use futures::future::BoxFuture;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use tracing::{debug, error};

/// Logs every batch before handing it to the wrapped exporter.
#[derive(Debug)]
pub struct DebugSpanExporter<E> {
    inner: E,
}

impl<E> DebugSpanExporter<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: SpanExporter> SpanExporter for DebugSpanExporter<E> {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        debug!(spans = batch.len(), "Exporting spans");
        for span in &batch {
            debug!(
                name = %span.name,
                trace_id = %span.span_context.trace_id(),
                "Exporting span"
            );
        }
        let export = self.inner.export(batch);
        Box::pin(async move {
            let result = export.await;
            match &result {
                Ok(()) => debug!("Done exporting spans"),
                Err(err) => error!(error = %err, "Error exporting spans"),
            }
            result
        })
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
