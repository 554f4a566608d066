use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use verdict_core::Outcome;
use verdict_logging::{verdict_debug, verdict_trace};

/// Why a classifier call produced no outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    HttpStatus(u16),
    MalformedResponse,
    MissingField,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network error"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::MissingField => write!(f, "missing field"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifyError {
    pub kind: FailureKind,
    pub message: String,
}

impl ClassifyError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A single remote classification call.
///
/// Implementations should stop work promptly once `cancel` fires; the caller
/// discards any result that arrives after cancellation anyway.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, url: &str, cancel: CancellationToken) -> Result<Outcome, ClassifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Workflow run endpoint.
    pub endpoint: String,
    pub workflow_id: String,
    /// Sent as a bearer token when present.
    pub auth_token: Option<String>,
    /// Name of the workflow parameter carrying the item URL.
    pub input_parameter: String,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout. `None` waits until the call completes or is
    /// cancelled.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.coze.cn/v1/workflow/run".to_string(),
            workflow_id: String::new(),
            auth_token: None,
            input_parameter: "rawUrl".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: None,
        }
    }
}

/// Classifier backed by a workflow HTTP API that answers
/// `{ "data": <object or JSON string> }` with the result under `data.res`.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    settings: ClassifierSettings,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(settings: ClassifierSettings) -> Result<Self, ClassifyError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| ClassifyError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    async fn call(&self, url: &str) -> Result<Outcome, ClassifyError> {
        let mut parameters = Map::new();
        parameters.insert(
            self.settings.input_parameter.clone(),
            Value::String(url.to_string()),
        );
        let body = json!({
            "workflow_id": self.settings.workflow_id,
            "parameters": parameters,
        });

        let mut request = self
            .client
            .post(&self.settings.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(token) = &self.settings.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        verdict_trace!("Workflow response for {}: {} {}", url, status, text);

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ClassifyError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("workflow call failed: {detail}"),
            ));
        }

        decode_response(&text)
    }
}

#[async_trait::async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, url: &str, cancel: CancellationToken) -> Result<Outcome, ClassifyError> {
        // Dropping the request future aborts the underlying connection.
        tokio::select! {
            _ = cancel.cancelled() => {
                verdict_debug!("Classifier call for {} aborted", url);
                Err(ClassifyError::new(FailureKind::Cancelled, "request aborted"))
            }
            result = self.call(url) => result,
        }
    }
}

/// Resolves a workflow response body into an [`Outcome`].
pub fn decode_response(body: &str) -> Result<Outcome, ClassifyError> {
    let envelope: Value = serde_json::from_str(body).map_err(|err| {
        ClassifyError::new(
            FailureKind::MalformedResponse,
            format!("response is not JSON: {err}"),
        )
    })?;

    let data = match envelope.get("data") {
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded).map_err(|err| {
            ClassifyError::new(
                FailureKind::MalformedResponse,
                format!("data field is not valid JSON: {err}"),
            )
        })?,
        Some(Value::Null) | None => {
            return Err(ClassifyError::new(
                FailureKind::MissingField,
                "response has no data field",
            ))
        }
        Some(other) => other.clone(),
    };

    match data.get("res") {
        Some(res) if !is_blank(res) => Ok(Outcome::from_payload(res.clone())),
        _ => Err(ClassifyError::new(
            FailureKind::MissingField,
            "no res field in decoded data",
        )),
    }
}

/// `null`, `false`, `0` and `""` carry no answer.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClassifyError {
    if err.is_timeout() {
        return ClassifyError::new(FailureKind::Network, format!("timed out: {err}"));
    }
    if err.is_decode() {
        return ClassifyError::new(FailureKind::MalformedResponse, err.to_string());
    }
    ClassifyError::new(FailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_encoded_data() {
        let body = r#"{"code":0,"data":"{\"res\":{\"lijie\":\"合格\"}}"}"#;
        let outcome = decode_response(body).unwrap();
        assert_eq!(outcome.verdict_text(), "合格");
    }

    #[test]
    fn decodes_object_data() {
        let body = r#"{"data":{"res":"不合格"}}"#;
        assert_eq!(
            decode_response(body).unwrap(),
            Outcome::Text("不合格".to_string())
        );
    }

    #[test]
    fn missing_res_is_missing_field() {
        let err = decode_response(r#"{"data":{"other":1}}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingField);
        let err = decode_response(r#"{"msg":"ok"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingField);
        for body in [
            r#"{"data":{"res":""}}"#,
            r#"{"data":{"res":false}}"#,
            r#"{"data":{"res":0}}"#,
            r#"{"data":{"res":null}}"#,
            r#"{"data":"{\"res\":\"\"}"}"#,
        ] {
            let err = decode_response(body).unwrap_err();
            assert_eq!(err.kind, FailureKind::MissingField, "{body}");
        }
    }

    #[test]
    fn non_blank_scalars_are_kept() {
        assert_eq!(
            decode_response(r#"{"data":{"res":1}}"#).unwrap(),
            Outcome::Raw(json!(1))
        );
        assert_eq!(
            decode_response(r#"{"data":{"res":true}}"#).unwrap(),
            Outcome::Raw(json!(true))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_response("<html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
        let err = decode_response(r#"{"data":"{broken"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn error_display_keeps_kind() {
        let err = ClassifyError::new(FailureKind::HttpStatus(429), "workflow call failed: HTTP 429");
        assert_eq!(err.to_string(), "http status 429: workflow call failed: HTTP 429");
    }
}
