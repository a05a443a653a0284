use axum::{
    extract::FromRequestParts,
    http::{Request, StatusCode as HttpStatusCode, request::Parts},
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod layer;

pub use layer::{REQUEST_ID_HEADER, RequestContextLayer, RequestContextMiddleware};

pub const REQUEST_ID: &str = "request_id";
pub const METHOD: &str = "method";
pub const URI: &str = "uri";
pub const USER_AGENT: &str = "user_agent";

/// Request-scoped diagnostic key/value data
///
/// Populated by `RequestContextLayer` before the handler runs and enriched by
/// handlers along the way. Clones share the same underlying map, so a value
/// inserted by a handler is visible to the capture layer.
///
/// # Example
/// ```
/// use meshestra_relay::context::LogContext;
///
/// async fn create_order(ctx: LogContext) -> &'static str {
///     ctx.insert("order_id", "ord-42");
///     "created"
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct LogContext {
    entries: Arc<DashMap<String, String>>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned, sorted copy of the current entries.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// The context attached to a request, if any
    pub fn from_request<B>(request: &Request<B>) -> Option<Self> {
        request.extensions().get::<LogContext>().cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for LogContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let context = LogContext::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

impl<S> FromRequestParts<S> for LogContext
where
    S: Send + Sync,
{
    type Rejection = (HttpStatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<LogContext>().cloned().ok_or_else(|| {
            (
                HttpStatusCode::INTERNAL_SERVER_ERROR,
                "Log context missing: is RequestContextLayer installed?".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_clones_share_entries() {
        let context = LogContext::new();
        let handle = context.clone();
        handle.insert("requestId", "abc123");

        assert_eq!(context.get("requestId").as_deref(), Some("abc123"));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let context: LogContext = [("b", "2"), ("a", "1")].into_iter().collect();
        let snapshot = context.snapshot();

        context.insert("c", "3");
        context.remove("a");

        assert_eq!(
            snapshot.into_iter().collect::<Vec<_>>(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_from_request() {
        let mut request = Request::new(Body::empty());
        assert!(LogContext::from_request(&request).is_none());

        let context = LogContext::new();
        context.insert(REQUEST_ID, "abc123");
        request.extensions_mut().insert(context);

        let found = LogContext::from_request(&request).unwrap();
        assert_eq!(found.get(REQUEST_ID).as_deref(), Some("abc123"));
    }
}
