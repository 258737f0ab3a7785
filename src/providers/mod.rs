//! Vendor adapters.
//!
//! Each adapter turns one SDK call signature into an [`Interaction`] and
//! exposes it through [`Interceptor`]: the application passes its own SDK
//! call to `intercept`, or wraps it once with `wrap` and calls the result.
//!
//! [`Interaction`]: crate::pipelines::Interaction

#[cfg(feature = "bedrock")]
pub mod bedrock;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "watsonx")]
pub mod watsonx;

use std::fmt::Display;
use std::future::Future;

use futures::future::BoxFuture;

/// Async interception of one vendor call shape.
pub trait Interceptor<Req, Resp>: Send + Sync {
    /// Runs `call` inside an interaction. `call` is skipped when the prompt is
    /// blocked.
    fn intercept<F, Fut, E>(
        &self,
        request: Req,
        call: F,
    ) -> impl Future<Output = Result<Resp, E>> + Send
    where
        F: FnOnce(Req) -> Fut + Send,
        Fut: Future<Output = Result<Resp, E>> + Send,
        E: Display + Send;

    /// Returns `call` with the same signature, intercepted.
    fn wrap<'a, F, Fut, E>(&'a self, call: F) -> impl Fn(Req) -> BoxFuture<'a, Result<Resp, E>> + 'a
    where
        Self: Sized,
        Req: 'a,
        Resp: 'a,
        F: Fn(Req) -> Fut + Clone + Send + Sync + 'a,
        Fut: Future<Output = Result<Resp, E>> + Send + 'a,
        E: Display + Send + 'a,
    {
        move |request| {
            let call = call.clone();
            Box::pin(self.intercept(request, call))
        }
    }
}

/// Blocking counterpart of [`Interceptor`].
pub trait BlockingInterceptor<Req, Resp> {
    fn intercept_blocking<F, E>(&self, request: Req, call: F) -> Result<Resp, E>
    where
        F: FnOnce(Req) -> Result<Resp, E>,
        E: Display;

    fn wrap_blocking<'a, F, E>(&'a self, call: F) -> impl Fn(Req) -> Result<Resp, E> + 'a
    where
        Self: Sized,
        F: Fn(Req) -> Result<Resp, E> + 'a,
        E: Display,
    {
        move |request| self.intercept_blocking(request, &call)
    }
}
