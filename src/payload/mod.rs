use crate::capture::{CapturedError, Severity};
use crate::config::RelayConfig;
use crate::error::PayloadError;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const NOTIFIER_NAME: &str = env!("CARGO_PKG_NAME");
pub const NOTIFIER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the serialized body of a delivery task
///
/// Implementations must be pure: no I/O, no shared state changes. `id` is the
/// id of the delivery task the payload will travel in.
pub trait PayloadBuilder: Send + Sync + 'static {
    fn build_payload(&self, id: Uuid, captured: &CapturedError) -> Result<Vec<u8>, PayloadError>;
}

/// JSON report document
#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    pub id: Uuid,
    pub timestamp: String,
    pub severity: Severity,
    pub message: &'a str,
    pub error: ErrorSection<'a>,
    pub context: &'a BTreeMap<String, String>,
    pub environment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<&'a str>,
    pub notifier: Notifier,
}

#[derive(Debug, Serialize)]
pub struct ErrorSection<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'a str>,
    pub detail: &'a str,
    pub causes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct Notifier {
    pub name: &'static str,
    pub version: &'static str,
}

/// Default payload builder producing a JSON report document
#[derive(Clone, Debug)]
pub struct JsonPayloadBuilder {
    environment: String,
    code_version: Option<String>,
    host: Option<String>,
    access_token: Option<String>,
}

impl Default for JsonPayloadBuilder {
    fn default() -> Self {
        Self::new("development")
    }
}

impl JsonPayloadBuilder {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            code_version: None,
            host: None,
            access_token: None,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            code_version: config.code_version.clone(),
            host: config.host.clone(),
            access_token: config.access_token.clone(),
        }
    }

    pub fn code_version(mut self, version: impl Into<String>) -> Self {
        self.code_version = Some(version.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn document<'a>(&'a self, id: Uuid, captured: &'a CapturedError) -> ReportPayload<'a> {
        ReportPayload {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            severity: captured.severity,
            message: &captured.message,
            error: ErrorSection {
                kind: captured.kind.as_deref(),
                detail: &captured.detail,
                causes: &captured.causes,
                trace: captured.trace.as_deref(),
            },
            context: &captured.context,
            environment: &self.environment,
            code_version: self.code_version.as_deref(),
            host: self.host.as_deref(),
            access_token: self.access_token.as_deref(),
            notifier: Notifier {
                name: NOTIFIER_NAME,
                version: NOTIFIER_VERSION,
            },
        }
    }
}

impl PayloadBuilder for JsonPayloadBuilder {
    fn build_payload(&self, id: Uuid, captured: &CapturedError) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(&self.document(id, captured))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CAPTURE_SEVERITY;
    use serde_json::{Value, json};

    fn disk_full(context: BTreeMap<String, String>) -> CapturedError {
        CapturedError::from_error(
            CAPTURE_SEVERITY,
            &std::io::Error::other("disk full"),
            None,
            context,
        )
    }

    fn build(builder: &JsonPayloadBuilder, captured: &CapturedError) -> Value {
        serde_json::from_slice(&builder.build_payload(Uuid::new_v4(), captured).unwrap()).unwrap()
    }

    #[test]
    fn test_payload_carries_report_fields() {
        let context = BTreeMap::from([("requestId".to_string(), "abc123".to_string())]);
        let payload = build(&JsonPayloadBuilder::default(), &disk_full(context));

        assert_eq!(payload["severity"], "ERROR");
        assert_eq!(payload["message"], "disk full");
        assert_eq!(payload["context"], json!({ "requestId": "abc123" }));
        assert_eq!(payload["environment"], "development");
        assert_eq!(payload["notifier"]["name"], NOTIFIER_NAME);
        assert!(payload["error"].get("kind").is_none());
        assert!(payload["error"].get("trace").is_none());
        assert!(payload.get("access_token").is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(payload["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_empty_context_is_an_object() {
        let payload = build(&JsonPayloadBuilder::default(), &disk_full(BTreeMap::new()));
        assert_eq!(payload["context"], json!({}));
    }

    #[test]
    fn test_optional_fields() {
        let builder = JsonPayloadBuilder::new("production")
            .code_version("abc1234")
            .host("web-1")
            .access_token("secret");
        let mut captured = disk_full(BTreeMap::new());
        captured.kind = Some("std::io::error::Error".to_string());
        captured.causes = vec!["no space left on device".to_string()];

        let payload = build(&builder, &captured);

        assert_eq!(payload["environment"], "production");
        assert_eq!(payload["code_version"], "abc1234");
        assert_eq!(payload["host"], "web-1");
        assert_eq!(payload["access_token"], "secret");
        assert_eq!(payload["error"]["kind"], "std::io::error::Error");
        assert_eq!(payload["error"]["causes"], json!(["no space left on device"]));
    }

    #[test]
    fn test_payload_id_is_the_given_task_id() {
        let id = Uuid::new_v4();
        let bytes = JsonPayloadBuilder::default()
            .build_payload(id, &disk_full(BTreeMap::new()))
            .unwrap();
        let payload: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["id"], id.to_string());
    }

    #[test]
    fn test_trace_is_written_when_present() {
        let mut captured = disk_full(BTreeMap::new());
        captured.trace = Some("0: meshestra_relay::export::run".to_string());

        let payload = build(&JsonPayloadBuilder::default(), &captured);
        assert_eq!(payload["error"]["trace"], "0: meshestra_relay::export::run");
    }
}
