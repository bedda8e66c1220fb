//! # Sample Lifecycle
//!
//! Starts the in-process backend, hands out applications wired to it, and
//! shuts everything down again.
//!
//! ## The SampleSystem Pattern
//!
//! ```rust,ignore
//! let system = SampleSystem::new(my_model_app());
//! let app = system.application()?;
//! let created = app.resource("MyModel")?.create(json!({ "name": "new" })).await?;
//!
//! drop(app);
//! system.shutdown().await?;
//! ```
//!
//! Every [`application`](SampleSystem::application) call generates a fresh
//! set of resources over the same session store, which is what a process
//! restart looks like to the session layer: whatever was persisted in the
//! durable tier is picked up again, nothing held in memory is.
//!
//! ## Graceful Shutdown
//!
//! The backend stops when the last transport clone is gone. Applications hold
//! clones through their dispatchers, so drop them before calling
//! [`shutdown`](SampleSystem::shutdown), which drops the system's own clone
//! and waits for the backend task.

pub mod sample_system;

pub use sample_system::*;
