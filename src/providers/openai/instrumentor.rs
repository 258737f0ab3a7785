use std::fmt::Display;
use std::future::Future;
use std::iter;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::chat::ChatInteraction;
use super::completion::CompletionInteraction;
use super::embeddings::EmbeddingsInteraction;
use crate::config::TraceSettings;
use crate::models::chat::{
    BlockingChatCompletionResponse, ChatCompletion, ChatCompletionRequest, ChatCompletionResponse,
};
use crate::models::completion::{CompletionRequest, CompletionResponse, CompletionResult};
use crate::models::embeddings::{EmbeddingsRequest, EmbeddingsResponse};
use crate::models::streaming::{ChatCompletionChunk, StreamError};
use crate::pipelines::{InteractionOutcome, Invocation, Orchestrator};
use crate::providers::{BlockingInterceptor, Interceptor};

/// Interceptor for the OpenAI chat, completion and embeddings endpoints.
#[derive(Clone)]
pub struct OpenAIInstrumentor {
    orchestrator: Orchestrator,
    settings: Arc<TraceSettings>,
}

impl OpenAIInstrumentor {
    pub fn new(orchestrator: Orchestrator, settings: Arc<TraceSettings>) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }
}

fn blocked_chunk(completion: ChatCompletion) -> Result<ChatCompletionChunk, StreamError> {
    Ok(ChatCompletionChunk::from(completion))
}

impl Interceptor<ChatCompletionRequest, ChatCompletionResponse> for OpenAIInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: ChatCompletionRequest,
        call: F,
    ) -> impl Future<Output = Result<ChatCompletionResponse, E>> + Send
    where
        F: FnOnce(ChatCompletionRequest) -> Fut + Send,
        Fut: Future<Output = Result<ChatCompletionResponse, E>> + Send,
        E: Display + Send,
    {
        async move {
            let is_stream = request.is_stream();
            let interaction = ChatInteraction::new(request.clone(), self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let invocation = match call(request).await? {
                        ChatCompletionResponse::Stream(stream) => Invocation::Stream(stream),
                        ChatCompletionResponse::NonStream(completion) => {
                            Invocation::Complete(completion)
                        }
                    };
                    Ok::<_, E>(invocation)
                })
                .await?;

            Ok(match outcome {
                InteractionOutcome::Completed(completion) => {
                    ChatCompletionResponse::NonStream(completion)
                }
                InteractionOutcome::Streaming(stream) => ChatCompletionResponse::Stream(stream),
                InteractionOutcome::Blocked { response, .. } if is_stream => {
                    ChatCompletionResponse::Stream(stream::iter([blocked_chunk(response)]).boxed())
                }
                InteractionOutcome::Blocked { response, .. } => {
                    ChatCompletionResponse::NonStream(response)
                }
            })
        }
    }
}

impl BlockingInterceptor<ChatCompletionRequest, BlockingChatCompletionResponse>
    for OpenAIInstrumentor
{
    fn intercept_blocking<F, E>(
        &self,
        request: ChatCompletionRequest,
        call: F,
    ) -> Result<BlockingChatCompletionResponse, E>
    where
        F: FnOnce(ChatCompletionRequest) -> Result<BlockingChatCompletionResponse, E>,
        E: Display,
    {
        let is_stream = request.is_stream();
        let interaction = ChatInteraction::new(request.clone(), self.settings.clone());
        let outcome = self.orchestrator.run_blocking(interaction, move |_cx| {
            let invocation = match call(request)? {
                ChatCompletionResponse::Stream(chunks) => Invocation::Stream(chunks),
                ChatCompletionResponse::NonStream(completion) => Invocation::Complete(completion),
            };
            Ok::<_, E>(invocation)
        })?;

        Ok(match outcome {
            InteractionOutcome::Completed(completion) => ChatCompletionResponse::NonStream(completion),
            InteractionOutcome::Streaming(chunks) => ChatCompletionResponse::Stream(Box::new(chunks)),
            InteractionOutcome::Blocked { response, .. } if is_stream => {
                ChatCompletionResponse::Stream(Box::new(iter::once(blocked_chunk(response))))
            }
            InteractionOutcome::Blocked { response, .. } => ChatCompletionResponse::NonStream(response),
        })
    }
}

impl Interceptor<CompletionRequest, CompletionResult> for OpenAIInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: CompletionRequest,
        call: F,
    ) -> impl Future<Output = Result<CompletionResult, E>> + Send
    where
        F: FnOnce(CompletionRequest) -> Fut + Send,
        Fut: Future<Output = Result<CompletionResult, E>> + Send,
        E: Display + Send,
    {
        async move {
            let is_stream = request.is_stream();
            let interaction = CompletionInteraction::new(request.clone(), self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let invocation = match call(request).await? {
                        CompletionResult::Stream(stream) => Invocation::Stream(stream),
                        CompletionResult::NonStream(response) => Invocation::Complete(response),
                    };
                    Ok::<_, E>(invocation)
                })
                .await?;

            Ok(match outcome {
                InteractionOutcome::Completed(response) => CompletionResult::NonStream(response),
                InteractionOutcome::Streaming(stream) => CompletionResult::Stream(stream),
                InteractionOutcome::Blocked { response, .. } if is_stream => {
                    let fragment: Result<CompletionResponse, StreamError> = Ok(response);
                    CompletionResult::Stream(stream::iter([fragment]).boxed())
                }
                InteractionOutcome::Blocked { response, .. } => CompletionResult::NonStream(response),
            })
        }
    }
}

impl Interceptor<EmbeddingsRequest, EmbeddingsResponse> for OpenAIInstrumentor {
    fn intercept<F, Fut, E>(
        &self,
        request: EmbeddingsRequest,
        call: F,
    ) -> impl Future<Output = Result<EmbeddingsResponse, E>> + Send
    where
        F: FnOnce(EmbeddingsRequest) -> Fut + Send,
        Fut: Future<Output = Result<EmbeddingsResponse, E>> + Send,
        E: Display + Send,
    {
        async move {
            let interaction = EmbeddingsInteraction::new(request.clone(), self.settings.clone());
            let outcome = self
                .orchestrator
                .run(interaction, move |_cx| async move {
                    let response = call(request).await?;
                    Ok::<Invocation<_, stream::Empty<Result<EmbeddingsResponse, StreamError>>>, E>(
                        Invocation::Complete(response),
                    )
                })
                .await?;

            Ok(match outcome {
                InteractionOutcome::Completed(response) => response,
                InteractionOutcome::Blocked { response, .. } => response,
                InteractionOutcome::Streaming(_) => unreachable!("embeddings are never streamed"),
            })
        }
    }
}
