//! # Observability & Tracing
//!
//! Every generated call is logged with structured fields instead of
//! interpolated strings:
//!
//! | Event | Level | Fields |
//! |-------|-------|--------|
//! | Resource generated, application ready | `info` | `model`, `path`, `actions`, `relations` |
//! | Call settled | `info` | `model`, `action`, `status` |
//! | Request dispatched, stub answered | `debug` | `model`, `action`, `method`, `path` |
//! | Call failed, session cleared on 401 | `warn` | `model`, `action`, `status`, `error` |
//! | Credential stored or cleared | `info` | `tier`, `user_id` |
//!
//! ```bash
//! RUST_LOG=info cargo run      # One line per settled call
//! RUST_LOG=debug cargo run     # Request paths and relation binding
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Calling it again is harmless; only the first subscriber is kept.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // `model` and `action` fields identify the source
        .compact()
        .try_init();
}
