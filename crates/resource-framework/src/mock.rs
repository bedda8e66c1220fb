//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] answers requests from a queue of expectations instead of a
//! real backend, so resource and dispatcher logic can be tested without a
//! server or sockets.
//!
//! ## When to use what
//!
//! | Tool | State | Use case |
//! |------|-------|----------|
//! | [`MockTransport`] | Scripted | Request shapes, error paths, session effects |
//! | [`create_mock_transport`] + [`expect_request`] | Manual | Answering one request at a time |
//! | `wiremock` + [`HttpTransport`](crate::HttpTransport) | Scripted HTTP | The wire encoding |
//! | The sample crate's backend actor | Real records | End-to-end scenarios |
//!
//! ## Fluent expectations
//!
//! ```rust
//! use resource_framework::mock::MockTransport;
//! use resource_framework::{AppDescriptor, Application, ModelDescriptor, SdkConfig, SessionStore};
//! use reqwest::Method;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockTransport::new();
//!     mock.expect(Method::GET, "/api/MyModels").respond(200, json!([]));
//!
//!     let app = Application::new(
//!         &AppDescriptor::new().model(ModelDescriptor::new("MyModel")),
//!         &SdkConfig::default(),
//!         SessionStore::in_memory(),
//!         mock.transport(),
//!     )
//!     .unwrap();
//!
//!     let items = app.resource("MyModel").unwrap().query(Default::default()).await.unwrap();
//!     assert!(items.is_empty());
//!     mock.verify();
//! }
//! ```
//!
//! ## Failure injection
//!
//! `fail` makes the transport itself fail, which is how an unreachable backend
//! looks to the dispatcher:
//!
//! ```rust,ignore
//! mock.expect(Method::GET, "/api/MyModels")
//!     .fail(SdkError::Transport("connection refused".into()));
//! ```
//!
//! A request that does not match the next expectation is answered with a
//! transport failure and recorded; [`MockTransport::verify`] reports it.

use crate::error::{Result, SdkError};
use crate::transport::{ChannelTransport, HttpRequest, HttpResponse, Transport, TransportRequest};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

struct Expectation {
    method: Method,
    path: String,
    response: Result<HttpResponse>,
}

/// A transport answering from scripted expectations, in order.
pub struct MockTransport {
    transport: ChannelTransport,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    received: Arc<Mutex<Vec<HttpRequest>>>,
    mismatches: Arc<Mutex<Vec<String>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a mock with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (transport, mut receiver) = ChannelTransport::channel(100);
        let expectations = Arc::new(Mutex::new(VecDeque::<Expectation>::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let mismatches = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let expectations = Arc::clone(&expectations);
            let received = Arc::clone(&received);
            let mismatches = Arc::clone(&mismatches);
            tokio::spawn(async move {
                while let Some(TransportRequest {
                    request,
                    respond_to,
                }) = receiver.recv().await
                {
                    let expectation = expectations.lock().pop_front();
                    received.lock().push(request.clone());

                    let response = match expectation {
                        Some(expected)
                            if expected.method == request.method && expected.path == request.path =>
                        {
                            expected.response
                        }
                        Some(expected) => {
                            let mismatch = format!(
                                "expected {} {}, got {} {}",
                                expected.method, expected.path, request.method, request.path
                            );
                            mismatches.lock().push(mismatch.clone());
                            Err(SdkError::Transport(mismatch))
                        }
                        None => {
                            let mismatch =
                                format!("unexpected {} {}", request.method, request.path);
                            mismatches.lock().push(mismatch.clone());
                            Err(SdkError::Transport(mismatch))
                        }
                    };
                    let _ = respond_to.send(response);
                }
            })
        };

        Self {
            transport,
            expectations,
            received,
            mismatches,
            _handle: handle,
        }
    }

    /// The transport to hand to an application or dispatcher.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.transport.clone())
    }

    /// Expects the next request to be `method path` (path without query).
    pub fn expect(&mut self, method: Method, path: impl Into<String>) -> ExpectationBuilder {
        ExpectationBuilder {
            method,
            path: path.into(),
            expectations: Arc::clone(&self.expectations),
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn received(&self) -> Vec<HttpRequest> {
        self.received.lock().clone()
    }

    /// Panics unless every expectation was consumed by a matching request.
    pub fn verify(&self) {
        let mismatches = self.mismatches.lock();
        if !mismatches.is_empty() {
            panic!("Unexpected requests: {}", mismatches.join("; "));
        }
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

/// Builder for one expected request.
pub struct ExpectationBuilder {
    method: Method,
    path: String,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl ExpectationBuilder {
    /// Answers with `status` and a JSON body.
    pub fn respond(self, status: u16, body: Value) {
        self.respond_with(HttpResponse::json(status, body));
    }

    pub fn respond_with(self, response: HttpResponse) {
        self.push(Ok(response));
    }

    /// Fails at the transport level, as an unreachable backend would.
    pub fn fail(self, error: SdkError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<HttpResponse>) {
        self.expectations.lock().push_back(Expectation {
            method: self.method,
            path: self.path,
            response,
        });
    }
}

// =============================================================================
// CHANNEL HELPERS
// =============================================================================

/// Creates a transport and the receiver its requests arrive on.
///
/// Useful when a test wants to look at a request before deciding how to
/// answer it. See [`expect_request`].
pub fn create_mock_transport(
    buffer_size: usize,
) -> (ChannelTransport, mpsc::Receiver<TransportRequest>) {
    ChannelTransport::channel(buffer_size)
}

/// Waits for the next request and returns it with its reply channel.
pub async fn expect_request(
    receiver: &mut mpsc::Receiver<TransportRequest>,
) -> Option<(HttpRequest, oneshot::Sender<Result<HttpResponse>>)> {
    receiver.recv().await.map(
        |TransportRequest {
             request,
             respond_to,
         }| (request, respond_to),
    )
}
