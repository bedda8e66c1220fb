//! # Resource Sample
//!
//! The framework wired to an in-process backend, for the demo binary and the
//! end-to-end tests.
//!
//! - **[model]**: application descriptors, as metadata discovery would report them
//! - **[backend]**: a LoopBack-style REST backend running as an actor
//! - **[lifecycle]**: starts the backend and builds applications against it

pub mod backend;
pub mod lifecycle;
pub mod model;
