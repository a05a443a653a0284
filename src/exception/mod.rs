use crate::error::BoxError;
use axum::response::Response;

pub mod http;

pub use http::HttpExceptionFilter;

/// The ExceptionFilter trait
///
/// Filters turn errors that escaped the middleware stack into responses.
/// They must return a valid Response.
pub trait ExceptionFilter: Send + Sync + 'static {
    /// Catch an exception and return a response
    fn catch(&self, error: BoxError) -> Response;
}

/// Error handler for `axum::error_handling::HandleErrorLayer`.
///
/// Axum routers only accept infallible services, so the failure re-raised by the
/// capture layer ends here.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(
///         ServiceBuilder::new()
///             .layer(HandleErrorLayer::new(handle_error))
///             .layer(relay.layer()),
///     );
/// ```
pub async fn handle_error(error: BoxError) -> Response {
    HttpExceptionFilter.catch(error)
}
