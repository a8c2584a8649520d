//! Minimal HTTP client used to push scripts to instruments with a web interface.
//!
//! The types here describe requests and responses independently of the HTTP
//! library. [`HttpTransport`] is the seam: [`HttpClient`] sends over reqwest,
//! [`MockHttpTransport`] records requests for tests.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failure while building or sending a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// URI could not be parsed.
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri {
        /// Offending input
        uri: String,
        /// Parser message
        reason: String,
    },

    /// Only plain `http` and `https` are handled.
    #[error("Unsupported URI scheme '{0}'")]
    UnsupportedScheme(String),

    /// Body serialization failed.
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No response within the client timeout.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// Connection or protocol failure.
    #[error("Request to {uri} failed: {source}")]
    Send {
        /// Target URI
        uri: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure reported by, or while reading, a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Non-success status code.
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// Body is not the expected JSON.
    #[error("Invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Either side of an HTTP exchange failed.
#[derive(Debug, Error)]
pub enum HttpError {
    /// See [`RequestError`].
    #[error(transparent)]
    Request(#[from] RequestError),
    /// See [`ResponseError`].
    #[error(transparent)]
    Response(#[from] ResponseError),
}

// ============================================================================
// Uri
// ============================================================================

/// Absolute `http`/`https` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    url: reqwest::Url,
}

impl Uri {
    /// Parse and check the scheme.
    pub fn parse(input: &str) -> Result<Self, RequestError> {
        let url = reqwest::Url::parse(input).map_err(|err| RequestError::InvalidUri {
            uri: input.to_string(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(RequestError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(RequestError::InvalidUri {
                uri: input.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(Self { url })
    }

    /// `http://<host><path>`.
    pub fn http(host: &str, path: &str) -> Result<Self, RequestError> {
        let path = path.trim_start_matches('/');
        Self::parse(&format!("http://{host}/{path}"))
    }

    /// Scheme, `http` or `https`.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// Path component, `/` at minimum.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Full URI text.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl FromStr for Uri {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// Outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Target
    pub uri: Uri,
    /// Extra headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Body, if any
    pub body: Option<String>,
}

impl Request {
    fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET` request.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::Get, uri)
    }

    /// `POST` request.
    pub fn post(uri: Uri) -> Self {
        Self::new(Method::Post, uri)
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, RequestError> {
        let body = serde_json::to_string(value)?;
        let mut request = self.header("Content-Type", "application/json");
        request.body = Some(body);
        Ok(request)
    }

    /// Body parsed back as JSON, mostly useful when inspecting recorded requests.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

/// Received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// Headers in received order
    pub headers: Vec<(String, String)>,
    /// Body decoded as text
    pub body: String,
}

impl Response {
    /// Response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into an error.
    pub fn error_for_status(self) -> Result<Self, ResponseError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ResponseError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResponseError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Sends requests and returns responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and wait for the complete response.
    async fn send(&self, request: Request) -> Result<Response, HttpError>;
}

/// reqwest backed client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Client whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RequestError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: Request) -> Result<Response, HttpError> {
        let uri = request.uri.to_string();
        let mut builder = match request.method {
            Method::Get => self.client.get(request.uri.as_str()),
            Method::Post => self.client.post(request.uri.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::trace!(%uri, method = ?request.method, "HTTP request");
        let response = builder.send().await.map_err(|source| {
            if source.is_timeout() {
                RequestError::Timeout(uri.clone())
            } else {
                RequestError::Send {
                    uri: uri.clone(),
                    source,
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(ResponseError::Body)?;
        tracing::trace!(%uri, status, "HTTP response");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Default)]
struct MockHttpState {
    requests: Vec<Request>,
    responses: VecDeque<Response>,
}

/// Records requests and answers with queued responses, `200` when none is queued.
#[derive(Debug, Clone, Default)]
pub struct MockHttpTransport {
    state: Arc<Mutex<MockHttpState>>,
}

impl MockHttpTransport {
    /// Empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockHttpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the response for the next request.
    pub fn push_response(&self, response: Response) {
        self.state().responses.push_back(response);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: Request) -> Result<Response, HttpError> {
        let mut state = self.state();
        state.requests.push(request);
        Ok(state
            .responses
            .pop_front()
            .unwrap_or_else(|| Response::new(200, "")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uri_parse() {
        let uri = Uri::parse("http://192.168.0.5/HttpCommand").unwrap();
        assert_eq!(uri.scheme(), "http");
        assert_eq!(uri.host(), "192.168.0.5");
        assert_eq!(uri.port(), 80);
        assert_eq!(uri.path(), "/HttpCommand");

        let uri: Uri = "https://lab.local:8443/".parse().unwrap();
        assert_eq!(uri.port(), 8443);
    }

    #[test]
    fn test_uri_errors() {
        assert!(matches!(
            Uri::parse("not a uri"),
            Err(RequestError::InvalidUri { .. })
        ));
        assert!(matches!(
            Uri::parse("ftp://host/file"),
            Err(RequestError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_uri_http_helper() {
        let uri = Uri::http("10.0.0.2", "/HttpCommand").unwrap();
        assert_eq!(uri.as_str(), "http://10.0.0.2/HttpCommand");
    }

    #[test]
    fn test_json_request() {
        let uri = Uri::http("10.0.0.2", "HttpCommand").unwrap();
        let request = Request::post(uri)
            .json(&json!({"command": "keyInput", "value": "K"}))
            .unwrap();
        assert_eq!(request.method, Method::Post);
        assert!(request
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
        assert_eq!(request.json_body().unwrap()["value"], "K");
    }

    #[test]
    fn test_response_status() {
        assert!(Response::new(204, "").error_for_status().is_ok());
        let err = Response::new(500, "busy").error_for_status().unwrap_err();
        assert_eq!(err.to_string(), "HTTP status 500: busy");
    }

    #[test]
    fn test_response_json() {
        let response = Response::new(200, r#"{"status": "ok"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["status"], "ok");
        assert!(Response::new(200, "{").json::<serde_json::Value>().is_err());
    }

    #[tokio::test]
    async fn test_mock_transport() {
        let mock = MockHttpTransport::new();
        mock.push_response(Response::new(503, ""));
        let uri = Uri::http("10.0.0.2", "x").unwrap();

        let first = mock.send(Request::get(uri.clone())).await.unwrap();
        let second = mock.send(Request::get(uri)).await.unwrap();
        assert_eq!(first.status, 503);
        assert_eq!(second.status, 200);
        assert_eq!(mock.requests().len(), 2);
    }
}
