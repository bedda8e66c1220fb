//! # Relation Scope Binder
//!
//! A [`RelationAccessor`] is the sub-resource a relation declares on its owner,
//! rooted at `<owner path>/:id/<relation>`. The owner id is bound into every
//! call, so an accessor cannot reach the network without one.
//!
//! | Kind | Fetch | Nested actions |
//! |------|-------|----------------|
//! | `hasMany`, `hasManyThrough`, `hasAndBelongsToMany` | `list` | `create`, `destroyAll` |
//! | `hasOne` | `fetch` | `create` |
//! | `belongsTo` | `fetch` | none |
//!
//! Records created through a relation are tagged with the target model.

use crate::action::{ActionDef, HttpVerb, Params, ReturnShape, CREATE};
use crate::descriptor::{normalize_name, ModelDescriptor, RelationDescriptor, RelationKind};
use crate::dispatcher::{Call, Dispatcher, Pending, Settle, Shared};
use crate::error::{Result, SdkError};
use crate::instance::{Collection, Instance};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const DESTROY_ALL: &str = "destroyAll";

const TO_MANY_ACTIONS: &[&str] = &[CREATE, DESTROY_ALL];
const HAS_ONE_ACTIONS: &[&str] = &[CREATE];

pub struct RelationAccessor {
    name: String,
    kind: RelationKind,
    owner: String,
    target: String,
    foreign_key: String,
    through: Option<String>,
    owner_path: String,
    fetch: Arc<ActionDef>,
    create: Arc<ActionDef>,
    destroy_all: Arc<ActionDef>,
    dispatcher: Arc<Dispatcher>,
}

impl RelationAccessor {
    pub(crate) fn bind(
        owner: &ModelDescriptor,
        name: &str,
        relation: &RelationDescriptor,
        owner_path: &str,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let path = format!("/:id/{name}");
        let fetch_shape = if relation.kind.is_to_many() {
            ReturnShape::Collection
        } else {
            ReturnShape::Object
        };
        let accessor = Self {
            name: name.to_string(),
            kind: relation.kind,
            owner: owner.normalized_name(),
            target: normalize_name(&relation.model),
            foreign_key: relation.resolved_foreign_key(&owner.name, name),
            through: relation.resolved_through(&owner.name),
            owner_path: owner_path.to_string(),
            fetch: Arc::new(ActionDef::new(name, HttpVerb::Get, path.clone()).returns(fetch_shape)),
            create: Arc::new(ActionDef::new(CREATE, HttpVerb::Post, path.clone())),
            destroy_all: Arc::new(
                ActionDef::new(DESTROY_ALL, HttpVerb::Delete, path).returns(ReturnShape::Empty),
            ),
            dispatcher,
        };
        debug!(
            owner = %accessor.owner,
            relation = %accessor.name,
            kind = ?accessor.kind,
            target = %accessor.target,
            foreign_key = %accessor.foreign_key,
            "Relation bound"
        );
        accessor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Normalized name of the related model.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn through(&self) -> Option<&str> {
        self.through.as_deref()
    }

    /// Nested actions this accessor exposes.
    pub fn action_names(&self) -> &'static [&'static str] {
        match self.kind {
            RelationKind::HasOne => HAS_ONE_ACTIONS,
            RelationKind::BelongsTo => &[],
            _ => TO_MANY_ACTIONS,
        }
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.action_names().contains(&action)
    }

    /// Lists the related records of a to-many relation.
    pub fn list(&self, owner_id: impl Into<Value>, params: Params) -> Result<Pending<Collection>> {
        if !self.kind.is_to_many() {
            return Err(self.unknown("list"));
        }
        self.start(&self.fetch, owner_id.into(), params, None, Collection::new())
    }

    /// Fetches the related record of a to-one relation.
    pub fn fetch(&self, owner_id: impl Into<Value>) -> Result<Pending<Instance>> {
        if self.kind.is_to_many() {
            return Err(self.unknown("fetch"));
        }
        self.start(
            &self.fetch,
            owner_id.into(),
            Params::new(),
            None,
            Instance::empty(&self.target),
        )
    }

    /// Creates a related record. The result is tagged with the target model.
    pub fn create(&self, owner_id: impl Into<Value>, data: Value) -> Result<Pending<Instance>> {
        if !self.has_action(CREATE) {
            return Err(self.unknown(CREATE));
        }
        let placeholder = Instance::from_value(&self.target, data.clone());
        self.start(&self.create, owner_id.into(), Params::new(), Some(data), placeholder)
    }

    /// Deletes every related record. Through relations also drop their link rows.
    pub fn destroy_all(&self, owner_id: impl Into<Value>) -> Result<Pending<()>> {
        if !self.has_action(DESTROY_ALL) {
            return Err(self.unknown(DESTROY_ALL));
        }
        self.start(&self.destroy_all, owner_id.into(), Params::new(), None, ())
    }

    fn start<T: Settle>(
        &self,
        action: &Arc<ActionDef>,
        owner_id: Value,
        mut params: Params,
        body: Option<Value>,
        placeholder: T,
    ) -> Result<Pending<T>> {
        if owner_id.is_null() || owner_id.as_str().is_some_and(str::is_empty) {
            return Err(SdkError::InvalidArgument(format!(
                "{}.{} needs the owner id",
                self.owner, self.name
            )));
        }
        params.insert("id".to_string(), owner_id);

        let mut call = Call::new(Arc::clone(action), &self.target, &self.owner_path).params(params);
        if let Some(body) = body {
            call = call.body(body);
        }
        Ok(self.dispatcher.invoke(call, Shared::new(placeholder)))
    }

    fn unknown(&self, action: &str) -> SdkError {
        SdkError::UnknownAction {
            model: self.owner.clone(),
            action: format!("{}.{}", self.name, action),
        }
    }
}

impl fmt::Debug for RelationAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationAccessor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("target", &self.target)
            .field("foreign_key", &self.foreign_key)
            .field("through", &self.through)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdkConfig;
    use crate::mock::MockTransport;
    use crate::session::SessionManager;
    use crate::store::SessionStore;
    use reqwest::Method;
    use serde_json::json;

    fn accessor(
        mock: &MockTransport,
        owner: &str,
        name: &str,
        relation: RelationDescriptor,
    ) -> RelationAccessor {
        let config = SdkConfig::default();
        let session = Arc::new(SessionManager::new(SessionStore::in_memory(), &config).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(mock.transport(), session, &config));
        let owner = ModelDescriptor::new(owner);
        let path = config.model_path(&owner.rest_plural());
        RelationAccessor::bind(&owner, name, &relation, &path, dispatcher)
    }

    #[tokio::test]
    async fn test_habtm_create_is_tagged_with_target() {
        let mut mock = MockTransport::new();
        mock.expect(Method::POST, "/api/products/1/categories")
            .respond(200, json!({ "id": 5, "name": "a-cat" }));
        let categories = accessor(
            &mock,
            "product",
            "categories",
            RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "category"),
        );

        assert_eq!(categories.action_names(), &["create", "destroyAll"]);
        assert_eq!(categories.through(), Some("CategoryProduct"));
        let created = categories
            .create(1, json!({ "name": "a-cat" }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(created.model(), "Category");
        assert_eq!(created.id(), Some(&json!(5)));
        mock.verify();
    }

    #[tokio::test]
    async fn test_null_owner_id_is_rejected_before_dispatch() {
        let mock = MockTransport::new();
        let orders = accessor(
            &mock,
            "Customer",
            "orders",
            RelationDescriptor::new(RelationKind::HasMany, "Order"),
        );

        let err = orders.list(Value::Null, Params::new()).unwrap_err();
        assert!(matches!(err, SdkError::InvalidArgument(_)));
        let err = orders.create("", json!({})).unwrap_err();
        assert!(matches!(err, SdkError::InvalidArgument(_)));
        assert!(mock.received().is_empty());
    }

    #[tokio::test]
    async fn test_to_one_relations_expose_fetch() {
        let mut mock = MockTransport::new();
        mock.expect(Method::GET, "/api/Orders/3/customer")
            .respond(200, json!({ "id": 1, "name": "Alice" }));
        let customer = accessor(
            &mock,
            "Order",
            "customer",
            RelationDescriptor::new(RelationKind::BelongsTo, "Customer"),
        );

        assert!(customer.action_names().is_empty());
        assert_eq!(customer.foreign_key(), "customerId");
        assert!(matches!(
            customer.create(3, json!({})),
            Err(SdkError::UnknownAction { .. })
        ));
        assert!(customer.list(3, Params::new()).is_err());

        let fetched = customer.fetch(3).unwrap().await.unwrap();
        assert_eq!(fetched.model(), "Customer");
        mock.verify();
    }

    #[tokio::test]
    async fn test_destroy_all_and_list() {
        let mut mock = MockTransport::new();
        mock.expect(Method::DELETE, "/api/Customers/1/orders").respond_with(
            crate::transport::HttpResponse::new(204, Value::Null),
        );
        mock.expect(Method::GET, "/api/Customers/1/orders").respond(200, json!([]));
        let orders = accessor(
            &mock,
            "Customer",
            "orders",
            RelationDescriptor::new(RelationKind::HasMany, "Order"),
        );

        orders.destroy_all(1).unwrap().await.unwrap();
        let remaining = orders.list(1, Params::new()).unwrap().await.unwrap();
        assert!(remaining.is_empty());
        mock.verify();
    }
}
