//! # Resource Sample
//!
//! Walks through a session against the in-process backend:
//!
//! 1. Starting a [`SampleSystem`] for an application with authentication.
//! 2. Signing up and logging in as a user.
//! 3. Reading the current user and creating an unrelated record.
//! 4. Logging out and shutting down.
//!
//! Run with `RUST_LOG=info` (or `debug`) to follow the calls. Configuration
//! comes from `RESOURCE_SDK_*` variables; `RESOURCE_SDK_DURABLE_STORE_PATH`
//! keeps the remembered session in a file between runs.

use resource_framework::tracing::setup_tracing;
use resource_framework::{params, SdkConfig, SessionStore};
use resource_sample::lifecycle::SampleSystem;
use resource_sample::model::auth_app;
use serde_json::json;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = SdkConfig::load(None).map_err(|e| e.to_string())?;
    let store = SessionStore::from_config(&config).map_err(|e| e.to_string())?;
    let descriptor = auth_app().map_err(|e| e.to_string())?;
    let system = SampleSystem::with_config(descriptor, config, store);

    let app = system.application().map_err(|e| e.to_string())?;
    let user = app.resource("User").map_err(|e| e.to_string())?;
    let credentials = json!({ "email": "alice@example.com", "password": "secret" });

    let span = tracing::info_span!("sign_up");
    let token = async {
        user.create(credentials.clone())
            .await
            .map_err(|e| e.to_string())?;
        user.login(params(json!({ "rememberMe": true })), credentials)
            .map_err(|e| e.to_string())?
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;
    info!(user_id = ?token.get("userId"), "Logged in");

    let current = user
        .get_current()
        .map_err(|e| e.to_string())?
        .await
        .map_err(|e| e.to_string())?;
    info!(email = ?current.get("email"), "Current user");

    let product = app.resource("Product").map_err(|e| e.to_string())?;
    match product.create(json!({ "model": "Widget" })).await {
        Ok(created) => info!(id = ?created.id(), "Product created"),
        Err(e) => error!(error = %e, "Product creation failed"),
    }

    user.logout()
        .map_err(|e| e.to_string())?
        .await
        .map_err(|e| e.to_string())?;
    info!(authenticated = user.is_authenticated(), "Logged out");

    drop(product);
    drop(user);
    drop(app);
    system.shutdown().await?;

    info!("Sample completed successfully");
    Ok(())
}
