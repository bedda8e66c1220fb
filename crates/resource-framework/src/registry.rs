//! # Application Registry
//!
//! An [`Application`] is one application scope: the resources generated from
//! an [`AppDescriptor`], sharing one session manager and one dispatcher.
//! Resources are generated once, up front; lookups hand out the same `Arc`
//! every time.

use crate::config::SdkConfig;
use crate::descriptor::AppDescriptor;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SdkError};
use crate::resource::ResourceType;
use crate::session::SessionManager;
use crate::store::SessionStore;
use crate::transport::{HttpTransport, Transport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct Application {
    name: Option<String>,
    /// Keyed by both normalized and verbatim model names.
    resources: BTreeMap<String, Arc<ResourceType>>,
    session: Arc<SessionManager>,
}

impl Application {
    /// Generates every resource of `descriptor` over the given store and transport.
    pub fn new(
        descriptor: &AppDescriptor,
        config: &SdkConfig,
        store: SessionStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate().map_err(SdkError::InvalidArgument)?;
        let session = Arc::new(SessionManager::new(store, config)?);
        let dispatcher = Arc::new(Dispatcher::new(transport, Arc::clone(&session), config));

        let mut resources = BTreeMap::new();
        let mut normalized = BTreeMap::new();
        for model in &descriptor.models {
            let resource = Arc::new(ResourceType::generate(
                model,
                descriptor.enable_auth,
                config,
                Arc::clone(&dispatcher),
            )?);
            if normalized
                .insert(resource.name().to_string(), model.name.clone())
                .is_some()
            {
                return Err(SdkError::NameConflict {
                    model: resource.name().to_string(),
                    name: model.name.clone(),
                });
            }
            resources.insert(model.name.clone(), Arc::clone(&resource));
            resources.insert(resource.name().to_string(), resource);
        }

        info!(
            app = descriptor.name.as_deref().unwrap_or("default"),
            models = normalized.len(),
            auth = descriptor.enable_auth,
            "Application ready"
        );

        Ok(Self {
            name: descriptor.name.clone(),
            resources,
            session,
        })
    }

    /// Talks to `config.base_url` over HTTP, with the store `config` describes.
    pub fn connect(descriptor: &AppDescriptor, config: &SdkConfig) -> Result<Self> {
        let store = SessionStore::from_config(config)?;
        let transport = Arc::new(HttpTransport::new(config)?);
        Self::new(descriptor, config, store, transport)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Looks a resource up by normalized or verbatim model name, case-sensitively.
    pub fn resource(&self, name: &str) -> Result<Arc<ResourceType>> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| SdkError::UnknownModel(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Normalized names of every generated resource.
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .resources
            .values()
            .map(|resource| resource.name())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModelDescriptor;
    use crate::mock::MockTransport;

    fn application(mock: &MockTransport, descriptor: &AppDescriptor) -> Result<Application> {
        Application::new(
            descriptor,
            &SdkConfig::default(),
            SessionStore::in_memory(),
            mock.transport(),
        )
    }

    #[tokio::test]
    async fn test_lookup_by_normalized_and_verbatim_name() {
        let mock = MockTransport::new();
        let app = application(
            &mock,
            &AppDescriptor::new()
                .model(ModelDescriptor::new("lower-case-not-an-identifier"))
                .model(ModelDescriptor::new("MyModel")),
        )
        .unwrap();

        let normalized = app.resource("Lower-case-not-an-identifier").unwrap();
        let verbatim = app.resource("lower-case-not-an-identifier").unwrap();
        assert!(Arc::ptr_eq(&normalized, &verbatim));
        assert!(Arc::ptr_eq(&app.resource("MyModel").unwrap(), &app.resource("MyModel").unwrap()));
        assert_eq!(app.resource_names(), vec!["Lower-case-not-an-identifier", "MyModel"]);

        // Lookups are case-sensitive
        assert!(!app.has("mymodel"));
        assert!(matches!(app.resource("mymodel"), Err(SdkError::UnknownModel(_))));
    }

    #[tokio::test]
    async fn test_models_normalizing_to_the_same_name_conflict() {
        let mock = MockTransport::new();
        let result = application(
            &mock,
            &AppDescriptor::new()
                .model(ModelDescriptor::new("user"))
                .model(ModelDescriptor::new("User")),
        );
        assert!(matches!(result, Err(SdkError::NameConflict { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mock = MockTransport::new();
        let config = SdkConfig {
            rest_api_root: "api".to_string(),
            ..SdkConfig::default()
        };
        let result = Application::new(
            &AppDescriptor::new(),
            &config,
            SessionStore::in_memory(),
            mock.transport(),
        );
        assert!(matches!(result, Err(SdkError::InvalidArgument(_))));
    }
}
