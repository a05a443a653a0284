use crate::capture::{RaisedFailure, Reporter, observe_boxed};
use crate::context::LogContext;
use crate::error::BoxError;
use axum::{body::Body, http::Request, response::Response};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower Layer that reports failures escaping the wrapped service
///
/// The layer only observes: responses pass through untouched, errors are
/// returned as they came out of the inner service, and panics keep unwinding
/// with their original payload.
#[derive(Clone)]
pub struct ErrorCaptureLayer {
    reporter: Arc<Reporter>,
}

impl ErrorCaptureLayer {
    pub fn new(reporter: Arc<Reporter>) -> Self {
        Self { reporter }
    }
}

impl<S> Layer<S> for ErrorCaptureLayer {
    type Service = ErrorCaptureMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorCaptureMiddleware {
            inner,
            reporter: self.reporter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ErrorCaptureMiddleware<S> {
    inner: S,
    reporter: Arc<Reporter>,
}

impl<S> Service<Request<Body>> for ErrorCaptureMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
{
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let reporter = self.reporter.clone();
        // Keep the handle: handlers may still add keys before a failure.
        let context = LogContext::from_request(&request);

        // The instance that was polled ready is the one that must be called.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { inner.call(request).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(response)) => {
                    if let Some(raised) = response.extensions().get::<RaisedFailure>() {
                        reporter.observe_raised(raised, context.as_ref());
                    }
                    Ok(response)
                }
                Ok(Err(error)) => {
                    let error: BoxError = error.into();
                    observe_boxed(&reporter, &error, context.as_ref());
                    Err(error)
                }
                Err(panic) => {
                    reporter.observe_panic(panic.as_ref(), context.as_ref());
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}
