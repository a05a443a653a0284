use crate::capture::{CaptureOutcome, ErrorCaptureLayer, ErrorCaptureMiddleware, Reporter};
use crate::config::RelayConfig;
use crate::context::{LogContext, RequestContextLayer, RequestContextMiddleware};
use crate::payload::{JsonPayloadBuilder, PayloadBuilder};
use crate::queue::{ChannelQueue, DeliveryWorker, ReportSink, TaskQueue};
use std::error::Error as StdError;
use std::sync::Arc;
use tower::Layer;

/// Entry point wiring the capture layer to its queue and payload builder
///
/// # Example
/// ```rust,no_run
/// use axum::{Router, error_handling::HandleErrorLayer, routing::get};
/// use meshestra_relay::{ErrorRelay, RelayConfig, exception::handle_error, queue::TracingSink};
/// use std::sync::Arc;
/// use tower::ServiceBuilder;
///
/// # async fn run() -> meshestra_relay::Result<()> {
/// let config = RelayConfig::from_env()?;
/// let (relay, worker) = ErrorRelay::from_config(&config, Arc::new(TracingSink))?;
/// let worker = worker.spawn();
///
/// let app: Router = Router::new().route("/", get(|| async { "ok" })).layer(
///     ServiceBuilder::new()
///         .layer(HandleErrorLayer::new(handle_error))
///         .layer(relay.layer()),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ErrorRelay {
    reporter: Arc<Reporter>,
}

impl ErrorRelay {
    pub fn new(queue: Arc<dyn TaskQueue>, payload_builder: Arc<dyn PayloadBuilder>) -> Self {
        Self {
            reporter: Arc::new(Reporter::new(queue, payload_builder)),
        }
    }

    /// In-process setup: a `ChannelQueue` drained by a `DeliveryWorker` into `sink`.
    pub fn from_config(
        config: &RelayConfig,
        sink: Arc<dyn ReportSink>,
    ) -> crate::Result<(Self, DeliveryWorker)> {
        let (queue, receiver) = ChannelQueue::new(config.queue_capacity)?;
        let relay = Self::new(
            Arc::new(queue),
            Arc::new(JsonPayloadBuilder::from_config(config)),
        );
        let worker = DeliveryWorker::from_config(receiver, sink, config);
        Ok((relay, worker))
    }

    /// Request context and error capture, in that order.
    pub fn layer(&self) -> RelayLayer {
        RelayLayer {
            context: RequestContextLayer::new(),
            capture: self.capture_layer(),
        }
    }

    /// Error capture alone, for stacks that already attach a `LogContext`.
    pub fn capture_layer(&self) -> ErrorCaptureLayer {
        ErrorCaptureLayer::new(self.reporter.clone())
    }

    /// Report a failure from outside the request pipeline, e.g. a background job.
    pub fn report(
        &self,
        error: &(dyn StdError + 'static),
        context: Option<&LogContext>,
    ) -> CaptureOutcome {
        self.reporter.observe_error(error, None, context)
    }
}

/// `RequestContextLayer` wrapped around `ErrorCaptureLayer`
#[derive(Clone)]
pub struct RelayLayer {
    context: RequestContextLayer,
    capture: ErrorCaptureLayer,
}

impl<S> Layer<S> for RelayLayer {
    type Service = RequestContextMiddleware<ErrorCaptureMiddleware<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        self.context.layer(self.capture.layer(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::HandlerFailure;
    use crate::capture::tests::RecordingQueue;
    use crate::context::{REQUEST_ID, REQUEST_ID_HEADER};
    use crate::error::ReportingFailure;
    use crate::exception::handle_error;
    use crate::queue::{DeliveryTask, TracingSink};
    use async_trait::async_trait;
    use axum::{
        Router, body::Body, error_handling::HandleErrorLayer, http::Request, http::StatusCode,
        routing::get,
    };
    use std::sync::Mutex;
    use tower::{ServiceBuilder, ServiceExt};
    use tower_http::trace::TraceLayer;

    fn app(relay: &ErrorRelay) -> Router {
        async fn disk_full(ctx: LogContext) -> Result<&'static str, HandlerFailure> {
            ctx.insert("order_id", "ord-42");
            Err(std::io::Error::other("disk full").into())
        }

        async fn queue_unavailable() -> Result<&'static str, HandlerFailure> {
            Err(ReportingFailure::new("queue unavailable").into())
        }

        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/disk", get(disk_full))
            .route("/deliver", get(queue_unavailable))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(HandleErrorLayer::new(handle_error))
                    .layer(relay.layer()),
            )
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(REQUEST_ID_HEADER, "abc123")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_router_end_to_end() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let queue = Arc::new(RecordingQueue::default());
        let relay = ErrorRelay::new(queue.clone(), Arc::new(JsonPayloadBuilder::new("test")));
        let app = app(&relay);

        let response = app.clone().oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(queue.tasks.lock().unwrap().is_empty());

        let response = app.clone().oneshot(get_request("/deliver")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(queue.tasks.lock().unwrap().is_empty());

        let response = app.oneshot(get_request("/disk")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let payloads = queue.payloads();
        assert_eq!(payloads.len(), 1);
        let payload = &payloads[0];
        assert_eq!(payload["severity"], "ERROR");
        assert_eq!(payload["message"], "disk full");
        assert_eq!(payload["environment"], "test");
        assert_eq!(payload["context"][REQUEST_ID], "abc123");
        assert_eq!(payload["context"]["method"], "GET");
        assert_eq!(payload["context"]["uri"], "/disk");
        assert_eq!(payload["context"]["order_id"], "ord-42");
    }

    #[derive(Default)]
    struct CollectingSink {
        payloads: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl ReportSink for CollectingSink {
        async fn deliver(&self, task: &DeliveryTask) -> Result<(), ReportingFailure> {
            let value = serde_json::from_slice(&task.payload)
                .map_err(|e| ReportingFailure::with_source("invalid payload", e))?;
            self.payloads.lock().unwrap().push(value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_from_config_delivers_through_worker() {
        let config = RelayConfig {
            environment: "staging".to_string(),
            code_version: Some("abc1234".to_string()),
            ..RelayConfig::default()
        };
        let sink = Arc::new(CollectingSink::default());
        let (relay, worker) = ErrorRelay::from_config(&config, sink.clone()).unwrap();
        let worker = worker.spawn();

        let response = app(&relay).oneshot(get_request("/disk")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let stats = worker.shutdown().await.unwrap();
        assert_eq!(stats.delivered, 1);

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads[0]["message"], "disk full");
        assert_eq!(payloads[0]["environment"], "staging");
        assert_eq!(payloads[0]["code_version"], "abc1234");
    }

    #[tokio::test]
    async fn test_manual_report() {
        let queue = Arc::new(RecordingQueue::default());
        let relay = ErrorRelay::new(queue.clone(), Arc::new(JsonPayloadBuilder::default()));

        let context = LogContext::new();
        context.insert("job", "nightly-export");
        let outcome = relay.report(&std::io::Error::other("disk full"), Some(&context));
        assert!(matches!(outcome, CaptureOutcome::Enqueued(_)));

        let outcome = relay.report(&ReportingFailure::new("queue unavailable"), None);
        assert_eq!(outcome, CaptureOutcome::Skipped);

        assert_eq!(queue.payloads()[0]["context"]["job"], "nightly-export");
    }

    #[tokio::test]
    async fn test_full_queue_does_not_change_response() {
        let config = RelayConfig {
            queue_capacity: 1,
            ..RelayConfig::default()
        };
        let (relay, _worker) = ErrorRelay::from_config(&config, Arc::new(TracingSink)).unwrap();
        let app = app(&relay);

        for _ in 0..3 {
            let response = app.clone().oneshot(get_request("/disk")).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
