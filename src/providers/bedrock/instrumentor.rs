use std::fmt::Display;
use std::future::Future;
use std::iter;
use std::sync::Arc;

use aws_sdk_bedrockruntime::Client as BedrockRuntimeClient;
use aws_sdk_bedrockruntime::operation::RequestId;
use aws_sdk_bedrockruntime::primitives::Blob;
use futures::stream;
use tracing::debug;

use super::interaction::{BedrockInteraction, BedrockRequest, BedrockResponse};
use crate::config::TraceSettings;
use crate::models::streaming::StreamError;
use crate::pipelines::{InteractionOutcome, Invocation, Orchestrator};
use crate::providers::{BlockingInterceptor, Interceptor};

type NoChunks = stream::Empty<Result<BedrockResponse, StreamError>>;

/// Interceptor for Bedrock `InvokeModel`.
#[derive(Clone)]
pub struct BedrockInstrumentor {
    orchestrator: Orchestrator,
    settings: Arc<TraceSettings>,
}

impl BedrockInstrumentor {
    pub fn new(orchestrator: Orchestrator, settings: Arc<TraceSettings>) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// Sends `request` through `client` inside an interaction.
    pub async fn invoke_model(
        &self,
        client: &BedrockRuntimeClient,
        request: BedrockRequest,
    ) -> Result<BedrockResponse, aws_sdk_bedrockruntime::Error> {
        self.intercept(request, |request| send_invoke_model(client, request))
            .await
    }
}

async fn send_invoke_model(
    client: &BedrockRuntimeClient,
    request: BedrockRequest,
) -> Result<BedrockResponse, aws_sdk_bedrockruntime::Error> {
    debug!(model_id = %request.model_id, bytes = request.body.len(), "Invoking Bedrock model");
    let output = client
        .invoke_model()
        .model_id(request.model_id)
        .body(Blob::new(request.body))
        .set_content_type(request.content_type)
        .set_accept(request.accept)
        .send()
        .await?;

    let request_id = output.request_id().map(str::to_string);
    let content_type = output.content_type().to_string();
    Ok(BedrockResponse {
        request_id,
        content_type,
        body: output.body.into_inner(),
    })
}

fn into_response(outcome: InteractionOutcome<BedrockResponse, impl Sized>) -> BedrockResponse {
    match outcome {
        InteractionOutcome::Completed(response) | InteractionOutcome::Blocked { response, .. } => {
            response
        }
        InteractionOutcome::Streaming(_) => unreachable!("InvokeModel responses are never streamed"),
    }
}

impl Interceptor<BedrockRequest, BedrockResponse> for BedrockInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: BedrockRequest,
        call: F,
    ) -> impl Future<Output = Result<BedrockResponse, E>> + Send
    where
        F: FnOnce(BedrockRequest) -> Fut + Send,
        Fut: Future<Output = Result<BedrockResponse, E>> + Send,
        E: Display + Send,
    {
        async move {
            let interaction = BedrockInteraction::new(&request, self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let response = call(request).await?;
                    Ok::<Invocation<_, NoChunks>, E>(Invocation::Complete(response))
                })
                .await?;
            Ok(into_response(outcome))
        }
    }
}

impl BlockingInterceptor<BedrockRequest, BedrockResponse> for BedrockInstrumentor {
    fn intercept_blocking<F, E>(&self, request: BedrockRequest, call: F) -> Result<BedrockResponse, E>
    where
        F: FnOnce(BedrockRequest) -> Result<BedrockResponse, E>,
        E: Display,
    {
        let interaction = BedrockInteraction::new(&request, self.settings.clone());
        let outcome = self.orchestrator.run_blocking(interaction, move |_cx| {
            let response = call(request)?;
            Ok::<Invocation<_, iter::Empty<Result<BedrockResponse, StreamError>>>, E>(
                Invocation::Complete(response),
            )
        })?;
        Ok(into_response(outcome))
    }
}
