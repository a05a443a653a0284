use crate::context::{LogContext, METHOD, REQUEST_ID, URI, USER_AGENT};
use axum::{
    body::Body,
    http::{Request, header},
};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use tracing::instrument::Instrumented;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tower Layer that attaches a `LogContext` to every request
///
/// This is the base error-reporting layer: by the time the capture layer sees a
/// failure, the request's diagnostic context is already in place.
#[derive(Clone, Debug, Default)]
pub struct RequestContextLayer;

impl RequestContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextMiddleware { inner }
    }
}

#[derive(Clone, Debug)]
pub struct RequestContextMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestContextMiddleware<S>
where
    S: Service<Request<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Instrumented<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let context = match request.extensions().get::<LogContext>() {
            Some(existing) => existing.clone(),
            None => {
                let context = LogContext::new();
                request.extensions_mut().insert(context.clone());
                context
            }
        };
        populate(&context, &request);

        let span = tracing::info_span!(
            "request",
            request_id = %context.get(REQUEST_ID).unwrap_or_default(),
            method = %request.method(),
            uri = %request.uri(),
        );

        self.inner.call(request).instrument(span)
    }
}

/// Fill in request metadata without overwriting keys set upstream.
fn populate(context: &LogContext, request: &Request<Body>) {
    if !context.contains_key(REQUEST_ID) {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        context.insert(REQUEST_ID, request_id);
    }
    if !context.contains_key(METHOD) {
        context.insert(METHOD, request.method().as_str());
    }
    if !context.contains_key(URI) {
        context.insert(URI, request.uri().to_string());
    }
    if !context.contains_key(USER_AGENT) {
        if let Some(agent) = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            context.insert(USER_AGENT, agent);
        }
    }
}
