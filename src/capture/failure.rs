use crate::error::BoxError;
use crate::exception::http::error_response;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Error type for axum handlers whose failures should be reported
///
/// Axum handlers cannot fail at the service level, so a handler "raises" by
/// returning this type. It renders a 500 response and carries the original error
/// along in the response extensions as a [`RaisedFailure`], where
/// `ErrorCaptureLayer` picks it up. A stack trace of the raise site is taken
/// when `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enables one.
///
/// # Example
/// ```
/// use meshestra_relay::capture::HandlerFailure;
///
/// async fn read_report() -> Result<String, HandlerFailure> {
///     let body = std::fs::read_to_string("/var/reports/latest")?;
///     Ok(body)
/// }
/// ```
pub struct HandlerFailure {
    raised: RaisedFailure,
    status: StatusCode,
}

impl HandlerFailure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            raised: RaisedFailure {
                error: Arc::new(error),
                kind: Some(std::any::type_name::<E>()),
                trace: captured_trace(Backtrace::capture()),
            },
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap an already type-erased error. Its kind is unknown.
    pub fn from_boxed(error: BoxError) -> Self {
        Self {
            raised: RaisedFailure {
                error: Arc::from(error),
                kind: None,
                trace: captured_trace(Backtrace::capture()),
            },
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Respond with a status other than 500.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Replace the stack trace, e.g. with one taken by `Backtrace::force_capture`.
    pub fn with_backtrace(mut self, trace: Backtrace) -> Self {
        self.raised.trace = captured_trace(trace);
        self
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.raised.error()
    }
}

fn captured_trace(trace: Backtrace) -> Option<Arc<Backtrace>> {
    (trace.status() == BacktraceStatus::Captured).then(|| Arc::new(trace))
}

impl<E> From<E> for HandlerFailure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFailure")
            .field("error", &self.raised.error)
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raised.error, f)
    }
}

impl IntoResponse for HandlerFailure {
    fn into_response(self) -> Response {
        let message = self
            .status
            .canonical_reason()
            .unwrap_or("Internal Server Error");
        let mut response = error_response(self.status, message);
        response.extensions_mut().insert(self.raised);
        response
    }
}

/// The original error behind a failure response
#[derive(Clone, Debug)]
pub struct RaisedFailure {
    error: Arc<dyn StdError + Send + Sync>,
    kind: Option<&'static str>,
    trace: Option<Arc<Backtrace>>,
}

impl RaisedFailure {
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn kind(&self) -> Option<&'static str> {
        self.kind
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.trace.as_deref()
    }
}
