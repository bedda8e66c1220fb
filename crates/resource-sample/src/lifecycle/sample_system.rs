use crate::backend::Backend;
use resource_framework::{
    AppDescriptor, Application, ChannelTransport, Result, SdkConfig, SessionStore,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running backend and everything needed to build applications against it.
pub struct SampleSystem {
    descriptor: AppDescriptor,
    config: SdkConfig,
    store: SessionStore,
    transport: ChannelTransport,
    handle: JoinHandle<()>,
}

impl SampleSystem {
    /// Default configuration and an in-memory session store.
    pub fn new(descriptor: AppDescriptor) -> Self {
        Self::with_config(descriptor, SdkConfig::default(), SessionStore::in_memory())
    }

    /// Spawns the backend. Must be called inside a Tokio runtime.
    pub fn with_config(descriptor: AppDescriptor, config: SdkConfig, store: SessionStore) -> Self {
        let (backend, transport) = Backend::new(
            descriptor.clone(),
            &config.rest_api_root,
            &config.auth_header,
            32,
        );
        let handle = tokio::spawn(backend.run());
        info!(
            app = descriptor.name.as_deref().unwrap_or("default"),
            root = %config.rest_api_root,
            "Sample system started"
        );

        Self {
            descriptor,
            config,
            store,
            transport,
            handle,
        }
    }

    /// A freshly generated application over the shared store and backend.
    pub fn application(&self) -> Result<Application> {
        Application::new(
            &self.descriptor,
            &self.config,
            self.store.clone(),
            Arc::new(self.transport.clone()),
        )
    }

    /// The session store every application of this system persists into.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Closes the system's transport and waits for the backend to stop.
    pub async fn shutdown(self) -> std::result::Result<(), String> {
        info!("Shutting down sample system");
        drop(self.transport);
        self.handle
            .await
            .map_err(|e| format!("backend task failed: {e}"))?;
        info!("Sample system stopped");
        Ok(())
    }
}
