//! Capture of failures escaping the request pipeline
//!
//! ```text
//! request ─▶ RequestContextLayer ─▶ ErrorCaptureLayer ─▶ handlers
//!                                         │
//!                       failure escapes ◀─┘
//!                                         │
//!              Reporter::observe_* ─▶ PayloadBuilder ─▶ TaskQueue::submit
//!                                         │
//!                  original failure re-raised unchanged
//! ```

use crate::context::LogContext;
use crate::error::{BoxError, originates_from_reporting};
use crate::payload::PayloadBuilder;
use crate::queue::{DeliveryTask, TaskQueue};
use serde::Serialize;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

pub mod failure;
pub mod layer;

pub use failure::{HandlerFailure, RaisedFailure};
pub use layer::{ErrorCaptureLayer, ErrorCaptureMiddleware};

/// Severity label attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

/// Every captured failure is reported with this severity.
pub const CAPTURE_SEVERITY: Severity = Severity::Error;

pub const PANIC_KIND: &str = "panic";

/// Everything known about a failure at the moment it was observed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedError {
    pub severity: Severity,
    /// `Display` rendering of the failure
    pub message: String,
    /// Type name of the failure, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// `Debug` rendering of the failure
    pub detail: String,
    /// `Display` rendering of each error in the `source()` chain
    pub causes: Vec<String>,
    /// Stack trace taken where the failure was raised, when one was captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl CapturedError {
    pub fn from_error(
        severity: Severity,
        error: &(dyn StdError + 'static),
        kind: Option<&str>,
        context: BTreeMap<String, String>,
    ) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            severity,
            message: error.to_string(),
            kind: kind.map(str::to_string),
            detail: format!("{:?}", error),
            causes,
            trace: None,
            context,
        }
    }

    /// Attach the stack trace of the raise site. Disabled or unsupported traces are ignored.
    pub fn with_trace(mut self, trace: Option<&Backtrace>) -> Self {
        self.trace = trace
            .filter(|t| t.status() == BacktraceStatus::Captured)
            .map(|t| t.to_string());
        self
    }

    pub fn from_panic(
        severity: Severity,
        payload: &(dyn Any + Send),
        context: BTreeMap<String, String>,
    ) -> Self {
        let message = panic_message(payload);
        Self {
            severity,
            detail: format!("panicked: {}", message),
            message,
            kind: Some(PANIC_KIND.to_string()),
            causes: Vec::new(),
            trace: None,
            context,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// What happened to an observed failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The failure came from the delivery path and was left alone
    Skipped,
    /// A delivery task was handed to the queue
    Enqueued(Uuid),
    /// Building or submitting the task failed; the secondary failure was logged
    Absorbed,
}

/// Turns observed failures into delivery tasks
pub struct Reporter {
    queue: Arc<dyn TaskQueue>,
    payload_builder: Arc<dyn PayloadBuilder>,
}

impl Reporter {
    pub fn new(queue: Arc<dyn TaskQueue>, payload_builder: Arc<dyn PayloadBuilder>) -> Self {
        Self {
            queue,
            payload_builder,
        }
    }

    /// Report an error that escaped the downstream chain.
    ///
    /// Never fails: a failure of the reporting itself is logged and absorbed.
    pub fn observe_error(
        &self,
        error: &(dyn StdError + 'static),
        kind: Option<&str>,
        context: Option<&LogContext>,
    ) -> CaptureOutcome {
        self.observe(error, kind, None, context)
    }

    /// Report the failure carried by a `HandlerFailure` response.
    pub fn observe_raised(
        &self,
        raised: &RaisedFailure,
        context: Option<&LogContext>,
    ) -> CaptureOutcome {
        self.observe(raised.error(), raised.kind(), raised.backtrace(), context)
    }

    fn observe(
        &self,
        error: &(dyn StdError + 'static),
        kind: Option<&str>,
        trace: Option<&Backtrace>,
        context: Option<&LogContext>,
    ) -> CaptureOutcome {
        if originates_from_reporting(error) {
            tracing::debug!(error = %error, "not reporting a failure of the delivery path");
            return CaptureOutcome::Skipped;
        }

        let captured =
            CapturedError::from_error(CAPTURE_SEVERITY, error, kind, snapshot_of(context))
                .with_trace(trace);
        self.absorb(&captured)
    }

    /// Report a panic that unwound out of the downstream chain.
    pub fn observe_panic(
        &self,
        payload: &(dyn Any + Send),
        context: Option<&LogContext>,
    ) -> CaptureOutcome {
        let captured = CapturedError::from_panic(CAPTURE_SEVERITY, payload, snapshot_of(context));
        self.absorb(&captured)
    }

    /// Build the payload for `captured` and submit it as a single delivery task.
    ///
    /// The task id doubles as the report id, so a delivered report can be matched
    /// to the task that carried it.
    pub fn enqueue(&self, captured: &CapturedError) -> crate::Result<Uuid> {
        let id = Uuid::new_v4();
        let payload = self.payload_builder.build_payload(id, captured)?;
        self.queue.submit(DeliveryTask::with_id(id, payload))?;
        Ok(id)
    }

    /// Enqueue, absorbing both errors and panics from the queue or payload builder.
    fn absorb(&self, captured: &CapturedError) -> CaptureOutcome {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.enqueue(captured))) {
            Ok(Ok(id)) => {
                tracing::debug!(task_id = %id, message = %captured.message, "error delivery task enqueued");
                CaptureOutcome::Enqueued(id)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, message = %captured.message, "Error trying to enqueue error delivery task");
                CaptureOutcome::Absorbed
            }
            Err(panic) => {
                tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    message = %captured.message,
                    "Panic while enqueueing error delivery task"
                );
                CaptureOutcome::Absorbed
            }
        }
    }
}

/// Reports a boxed error, the form failures take inside tower.
pub(crate) fn observe_boxed(
    reporter: &Reporter,
    error: &BoxError,
    context: Option<&LogContext>,
) -> CaptureOutcome {
    reporter.observe_error(error.as_ref(), None, context)
}

fn snapshot_of(context: Option<&LogContext>) -> BTreeMap<String, String> {
    context.map(LogContext::snapshot).unwrap_or_default()
}
