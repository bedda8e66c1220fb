//! # Resource Framework
//!
//! The client-side runtime of a REST SDK generator. Given the model and
//! relation metadata of a LoopBack-style backend, it generates one callable
//! [`ResourceType`] per model, with CRUD operations, custom actions and
//! relation-scoped sub-resources, all backed by asynchronous network calls.
//! It also manages the authenticated session: an access-token credential, its
//! persistence across restarts, and local 401 answers for calls that need a
//! logged-in user when nobody is.
//!
//! ## Architecture Overview
//!
//! ```text
//! Application ──► ResourceType ──► RelationAccessor
//!      │               │                 │
//!      │               └──────┬──────────┘
//!      │                      ▼
//!      │                 Dispatcher ──► Transport (reqwest / channel / mock)
//!      │                      │
//!      └──────────────► SessionManager ──► SessionStore (durable + volatile)
//! ```
//!
//! 1. **Metadata** ([`descriptor`]) - what discovery says about the backend
//! 2. **Generation** ([`ResourceType`], [`RelationAccessor`]) - fixed-shape resources per model
//! 3. **Dispatch** ([`Dispatcher`], [`Pending`]) - calls that settle a shared placeholder
//! 4. **Session** ([`SessionManager`], [`SessionStore`]) - who is logged in, and where that is kept
//!
//! ## Quick Start
//!
//! ```no_run
//! use resource_framework::{params, AppDescriptor, Application, ModelDescriptor, SdkConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SdkConfig::load(None)?;
//!     let app = Application::connect(
//!         &AppDescriptor::new().model(ModelDescriptor::new("MyModel")),
//!         &config,
//!     )?;
//!
//!     let my_model = app.resource("MyModel")?;
//!     let created = my_model.create(json!({ "name": "new" })).await?;
//!     let fetched = my_model.get(params(json!({ "id": created.id() }))).await?;
//!     assert_eq!(fetched.get("name"), created.get("name"));
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Every call fails with an [`SdkError`]. A locally answered 401 has a status
//! but no headers, a server error has both, and a transport failure has
//! neither. See [`error`].
//!
//! ## Testing
//!
//! [`mock::MockTransport`] scripts responses without a server. See the
//! [`mock`] module for the patterns.

pub mod action;
pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod instance;
pub mod mock;
pub mod registry;
pub mod relation;
pub mod resource;
pub mod session;
pub mod store;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use action::{params, ActionDef, ActionScope, HttpVerb, Params, ReturnShape};
pub use config::SdkConfig;
pub use descriptor::{
    AppDescriptor, ModelDescriptor, PropertyDef, PropertyType, RelationDescriptor, RelationKind,
};
pub use dispatcher::{Dispatcher, Pending, Shared};
pub use error::{HttpFailure, Result, SdkError};
pub use instance::{Collection, Instance};
pub use registry::Application;
pub use relation::RelationAccessor;
pub use resource::{Invocation, ResourceType};
pub use reqwest::Method;
pub use session::{Credential, SessionManager};
pub use store::{FileStorage, MemoryStorage, SessionStore, StorageBackend, StoreTier};
pub use transport::{
    ChannelTransport, HttpRequest, HttpResponse, HttpTransport, Transport, TransportRequest,
};
