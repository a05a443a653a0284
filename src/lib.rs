//! # Meshestra Relay
//!
//! Error-capture middleware for axum/tower services.
//!
//! Every failure that escapes the request pipeline is turned into an error
//! report and handed to an asynchronous delivery queue, then re-raised exactly
//! as it was. The middleware never changes a response and never swallows a
//! failure; it is a side channel.
//!
//! ## Features
//!
//! - **Capture without interference**: errors, panics and failing handlers are
//!   reported and propagated unchanged
//! - **Loop prevention**: failures of the delivery path itself are never reported
//! - **Explicit request context**: a [`LogContext`] travels in request extensions,
//!   no thread-locals
//! - **Pluggable delivery**: bring your own [`TaskQueue`] and [`PayloadBuilder`], or
//!   use the in-process [`ChannelQueue`] drained by a [`DeliveryWorker`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, error_handling::HandleErrorLayer, routing::get};
//! use meshestra_relay::prelude::*;
//! use tower::ServiceBuilder;
//!
//! async fn export(ctx: LogContext) -> Result<&'static str, HandlerFailure> {
//!     ctx.insert("export_id", "exp-7");
//!     std::fs::read("/var/exports/latest")?;
//!     Ok("done")
//! }
//!
//! #[tokio::main]
//! async fn main() -> meshestra_relay::Result<()> {
//!     let config = RelayConfig::from_env()?;
//!     let (relay, worker) = ErrorRelay::from_config(&config, Arc::new(TracingSink))?;
//!     let worker = worker.spawn();
//!
//!     let app: Router = Router::new().route("/export", get(export)).layer(
//!         ServiceBuilder::new()
//!             .layer(HandleErrorLayer::new(handle_error))
//!             .layer(relay.layer()),
//!     );
//!
//!     // Serve your app...
//!     # let _ = app;
//!     let _ = worker.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod exception;
pub mod payload;
pub mod queue;
pub mod relay;

// Re-export core types
pub use capture::{CaptureOutcome, CapturedError, ErrorCaptureLayer, HandlerFailure, Severity};
pub use config::{ConfigService, RelayConfig};
pub use context::{LogContext, RequestContextLayer};
pub use error::{BoxError, RelayError, ReportingFailure, Result, SubmissionError};
pub use payload::{JsonPayloadBuilder, PayloadBuilder};
pub use queue::{ChannelQueue, DeliveryTask, DeliveryWorker, TaskQueue};
pub use relay::{ErrorRelay, RelayLayer};

/// Prelude module for convenient imports
///
/// ```
/// use meshestra_relay::prelude::*;
/// ```
pub mod prelude {
    pub use crate::capture::{HandlerFailure, RaisedFailure};
    pub use crate::config::{ConfigService, RelayConfig};
    pub use crate::context::LogContext;
    pub use crate::error::{RelayError, ReportingFailure};
    pub use crate::exception::{ExceptionFilter, HttpExceptionFilter, handle_error};
    pub use crate::payload::{JsonPayloadBuilder, PayloadBuilder};
    pub use crate::queue::{
        ChannelQueue, DeliveryTask, DeliveryWorker, ReportSink, TaskQueue, TracingSink,
    };
    pub use crate::relay::ErrorRelay;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
