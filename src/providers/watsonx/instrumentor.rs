use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::interaction::WatsonxInteraction;
use super::models::{
    BlockingGenerateStream, GenerateOutput, GenerateRequest, GenerateResponse, GenerateStream,
};
use crate::config::TraceSettings;
use crate::models::streaming::StreamError;
use crate::pipelines::{InteractionOutcome, Invocation, Orchestrator};
use crate::providers::{BlockingInterceptor, Interceptor};

/// Interceptor for Watsonx text generation, plain and streamed.
#[derive(Clone)]
pub struct WatsonxInstrumentor {
    orchestrator: Orchestrator,
    settings: Arc<TraceSettings>,
}

impl WatsonxInstrumentor {
    pub fn new(orchestrator: Orchestrator, settings: Arc<TraceSettings>) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    pub async fn generate<F, Fut, E>(&self, request: GenerateRequest, call: F) -> Result<GenerateOutput, E>
    where
        F: FnOnce(GenerateRequest) -> Fut + Send,
        Fut: Future<Output = Result<GenerateOutput, E>> + Send,
        E: Display + Send,
    {
        <Self as Interceptor<GenerateRequest, GenerateOutput>>::intercept(self, request, call).await
    }

    pub async fn generate_stream<F, Fut, E>(&self, request: GenerateRequest, call: F) -> Result<GenerateStream, E>
    where
        F: FnOnce(GenerateRequest) -> Fut + Send,
        Fut: Future<Output = Result<GenerateStream, E>> + Send,
        E: Display + Send,
    {
        <Self as Interceptor<GenerateRequest, GenerateStream>>::intercept(self, request, call).await
    }

    pub fn generate_blocking<F, E>(&self, request: GenerateRequest, call: F) -> Result<GenerateOutput, E>
    where
        F: FnOnce(GenerateRequest) -> Result<GenerateOutput, E>,
        E: Display,
    {
        <Self as BlockingInterceptor<GenerateRequest, GenerateOutput>>::intercept_blocking(self, request, call)
    }

    pub fn generate_stream_blocking<F, E>(
        &self,
        request: GenerateRequest,
        call: F,
    ) -> Result<BlockingGenerateStream, E>
    where
        F: FnOnce(GenerateRequest) -> Result<BlockingGenerateStream, E>,
        E: Display,
    {
        <Self as BlockingInterceptor<GenerateRequest, BlockingGenerateStream>>::intercept_blocking(
            self, request, call,
        )
    }
}

fn as_events(output: GenerateOutput) -> Vec<Result<GenerateResponse, StreamError>> {
    output.into_responses().into_iter().map(Ok).collect()
}

fn into_output<S>(outcome: InteractionOutcome<GenerateOutput, S>) -> Option<GenerateOutput> {
    match outcome {
        InteractionOutcome::Completed(output) | InteractionOutcome::Blocked { response: output, .. } => {
            Some(output)
        }
        InteractionOutcome::Streaming(_) => None,
    }
}

impl Interceptor<GenerateRequest, GenerateOutput> for WatsonxInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: GenerateRequest,
        call: F,
    ) -> impl Future<Output = Result<GenerateOutput, E>> + Send
    where
        F: FnOnce(GenerateRequest) -> Fut + Send,
        Fut: Future<Output = Result<GenerateOutput, E>> + Send,
        E: Display + Send,
    {
        async move {
            let interaction = WatsonxInteraction::new(request.clone(), self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let output = call(request).await?;
                    Ok::<Invocation<_, GenerateStream>, E>(Invocation::Complete(output))
                })
                .await?;
            Ok(match into_output(outcome) {
                Some(output) => output,
                None => unreachable!("plain generation is never streamed"),
            })
        }
    }
}

impl Interceptor<GenerateRequest, GenerateStream> for WatsonxInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: GenerateRequest,
        call: F,
    ) -> impl Future<Output = Result<GenerateStream, E>> + Send
    where
        F: FnOnce(GenerateRequest) -> Fut + Send,
        Fut: Future<Output = Result<GenerateStream, E>> + Send,
        E: Display + Send,
    {
        async move {
            let interaction = WatsonxInteraction::new(request.clone(), self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let events = call(request).await?;
                    Ok::<Invocation<GenerateOutput, _>, E>(Invocation::Stream(events))
                })
                .await?;
            Ok(match outcome {
                InteractionOutcome::Streaming(events) => events,
                InteractionOutcome::Completed(output) | InteractionOutcome::Blocked { response: output, .. } => {
                    stream::iter(as_events(output)).boxed()
                }
            })
        }
    }
}

impl BlockingInterceptor<GenerateRequest, GenerateOutput> for WatsonxInstrumentor {
    fn intercept_blocking<F, E>(&self, request: GenerateRequest, call: F) -> Result<GenerateOutput, E>
    where
        F: FnOnce(GenerateRequest) -> Result<GenerateOutput, E>,
        E: Display,
    {
        let interaction = WatsonxInteraction::new(request.clone(), self.settings.clone());
        let outcome = self.orchestrator.run_blocking(interaction, move |_cx| {
            let output = call(request)?;
            Ok::<Invocation<_, BlockingGenerateStream>, E>(Invocation::Complete(output))
        })?;
        Ok(match into_output(outcome) {
            Some(output) => output,
            None => unreachable!("plain generation is never streamed"),
        })
    }
}

impl BlockingInterceptor<GenerateRequest, BlockingGenerateStream> for WatsonxInstrumentor {
    fn intercept_blocking<F, E>(
        &self,
        request: GenerateRequest,
        call: F,
    ) -> Result<BlockingGenerateStream, E>
    where
        F: FnOnce(GenerateRequest) -> Result<BlockingGenerateStream, E>,
        E: Display,
    {
        let interaction = WatsonxInteraction::new(request.clone(), self.settings.clone());
        let outcome = self.orchestrator.run_blocking(interaction, move |_cx| {
            let events = call(request)?;
            Ok::<Invocation<GenerateOutput, _>, E>(Invocation::Stream(events))
        })?;
        Ok(match outcome {
            InteractionOutcome::Streaming(events) => Box::new(events),
            InteractionOutcome::Completed(output) | InteractionOutcome::Blocked { response: output, .. } => {
                Box::new(as_events(output).into_iter())
            }
        })
    }
}
