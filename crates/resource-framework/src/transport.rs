//! # Transport
//!
//! The network seam. The dispatcher hands a fully built [`HttpRequest`] to a
//! [`Transport`] and gets back an [`HttpResponse`] for any status code; only
//! failures to obtain a response at all are errors here.
//!
//! - [`HttpTransport`] talks to a real backend with `reqwest`.
//! - [`ChannelTransport`] forwards each request over a Tokio channel with a
//!   oneshot reply, so an in-process task can play the backend. The mock
//!   utilities in [`crate::mock`] are built on it.

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A request ready to go on the wire. `path` includes the REST root.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A response with any status. The body is `Value::Null` when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// A response with a JSON content type, as a REST backend sends it.
    pub fn json(status: u16, body: Value) -> Self {
        let mut response = Self::new(status, body);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport rooted at `base_url`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &SdkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .query(&request.query)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(body) => body,
                // Error pages are often not JSON; keep their text for the message.
                Err(_) if !(200..300).contains(&status) => {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                Err(e) => {
                    return Err(SdkError::Transport(format!("malformed response body: {e}")));
                }
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// A request travelling over a [`ChannelTransport`], with its reply channel.
#[derive(Debug)]
pub struct TransportRequest {
    pub request: HttpRequest,
    pub respond_to: oneshot::Sender<Result<HttpResponse>>,
}

/// Forwards requests to whoever owns the receiving end of the channel.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<TransportRequest>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<TransportRequest>) -> Self {
        Self { sender }
    }

    /// Creates a transport and the receiver a backend task should drain.
    pub fn channel(buffer_size: usize) -> (Self, mpsc::Receiver<TransportRequest>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(TransportRequest {
                request,
                respond_to,
            })
            .await
            .map_err(|_| SdkError::Transport("backend closed".into()))?;
        response
            .await
            .map_err(|_| SdkError::Transport("backend dropped response channel".into()))?
    }
}
