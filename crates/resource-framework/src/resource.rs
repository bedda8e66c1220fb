//! # Resource Factory
//!
//! [`ResourceType::generate`] turns one [`ModelDescriptor`] into the callable
//! resource for that model. The shape is fixed at generation:
//!
//! - built-ins `query`, `get`, `create`, `find` and the instance-level `save`
//! - the descriptor's custom actions, verbatim
//! - `login`, `logout` and `getCurrent` on the designated user model of an
//!   application with auth enabled, and nowhere else
//! - one [`RelationAccessor`] per declared relation
//!
//! Every call returns a [`Pending`] immediately; see [`crate::dispatcher`].

use crate::action::{
    builtin_actions, user_actions, ActionDef, ActionScope, HttpVerb, Params, ReturnShape, CREATE,
    FIND, GET, GET_CURRENT, LOGIN, LOGOUT, QUERY, SAVE, USER_ACTIONS,
};
use crate::config::SdkConfig;
use crate::descriptor::{ModelDescriptor, PropertyDef};
use crate::dispatcher::{Call, Dispatcher, Pending, SessionEffect, Settle, Shared};
use crate::error::{Result, SdkError};
use crate::instance::{Collection, Instance};
use crate::relation::RelationAccessor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Tag of the record a successful login settles into.
pub const ACCESS_TOKEN_MODEL: &str = "AccessToken";

const REMEMBER_ME: &str = "rememberMe";

/// A started call of any shape, as returned by [`ResourceType::invoke`].
#[derive(Debug)]
pub enum Invocation {
    Object(Pending<Instance>),
    Collection(Pending<Collection>),
    Empty(Pending<()>),
}

impl Invocation {
    /// Waits for the call and returns the settled value as JSON.
    pub async fn into_value(self) -> Result<Value> {
        match self {
            Invocation::Object(pending) => Ok(pending.await?.to_value()),
            Invocation::Collection(pending) => Ok(Value::Array(
                pending.await?.iter().map(Instance::to_value).collect(),
            )),
            Invocation::Empty(pending) => pending.await.map(|()| Value::Null),
        }
    }
}

/// The generated resource for one model.
pub struct ResourceType {
    name: String,
    model_name: String,
    base_path: String,
    properties: BTreeMap<String, PropertyDef>,
    actions: BTreeMap<String, Arc<ActionDef>>,
    relations: BTreeMap<String, RelationAccessor>,
    user_model: bool,
    dispatcher: Arc<Dispatcher>,
}

impl ResourceType {
    /// Builds the resource for `descriptor`, rejecting descriptors whose action
    /// or relation names collide.
    pub fn generate(
        descriptor: &ModelDescriptor,
        enable_auth: bool,
        config: &SdkConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        if descriptor.name.trim().is_empty() {
            return Err(SdkError::InvalidDescriptor("model without a name".into()));
        }
        let name = descriptor.normalized_name();
        let base_path = config.model_path(&descriptor.rest_plural());
        let user_model = enable_auth && descriptor.is_user_model();

        let mut actions = BTreeMap::new();
        let mut register = |action: ActionDef| -> Result<()> {
            let action_name = action.name.clone();
            if actions.insert(action_name.clone(), Arc::new(action)).is_some() {
                return Err(SdkError::NameConflict {
                    model: name.clone(),
                    name: action_name,
                });
            }
            Ok(())
        };
        for action in builtin_actions() {
            register(action)?;
        }
        if user_model {
            for action in user_actions() {
                register(action)?;
            }
        }
        for action in &descriptor.actions {
            // Session actions are reserved for the designated user model.
            if USER_ACTIONS.contains(&action.name.as_str()) && !user_model {
                return Err(SdkError::NameConflict {
                    model: name.clone(),
                    name: action.name.clone(),
                });
            }
            register(action.clone())?;
        }

        let dispatcher_for_relations = Arc::clone(&dispatcher);
        let mut relations = BTreeMap::new();
        for (relation_name, relation) in &descriptor.relations {
            if actions.contains_key(relation_name) {
                return Err(SdkError::NameConflict {
                    model: name.clone(),
                    name: relation_name.clone(),
                });
            }
            relations.insert(
                relation_name.clone(),
                RelationAccessor::bind(
                    descriptor,
                    relation_name,
                    relation,
                    &base_path,
                    Arc::clone(&dispatcher_for_relations),
                ),
            );
        }

        info!(
            model = %name,
            path = %base_path,
            actions = actions.len(),
            relations = relations.len(),
            user_model,
            "Resource generated"
        );

        Ok(Self {
            name,
            model_name: descriptor.name.clone(),
            base_path,
            properties: descriptor.properties.clone(),
            actions,
            relations,
            user_model,
            dispatcher,
        })
    }

    /// Normalized name, the tag carried by this resource's instances.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model name as the backend declared it.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyDef> {
        &self.properties
    }

    pub fn is_user_model(&self) -> bool {
        self.user_model
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name).map(Arc::as_ref)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.relations.keys().map(String::as_str).collect()
    }

    /// Every action and relation name, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .actions
            .keys()
            .chain(self.relations.keys())
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn relation(&self, name: &str) -> Result<&RelationAccessor> {
        self.relations.get(name).ok_or_else(|| self.unknown(name))
    }

    /// A new unsaved instance of this resource.
    pub fn new_instance(&self, data: Value) -> Shared<Instance> {
        Shared::new(Instance::from_value(&self.name, data))
    }

    /// Lists records. A `filter` object narrows the result.
    pub fn query(&self, params: Params) -> Pending<Collection> {
        self.start(QUERY, params, None, Collection::new())
    }

    /// Lists records matching the `filter` param.
    pub fn find(&self, params: Params) -> Pending<Collection> {
        self.start(FIND, params, None, Collection::new())
    }

    /// Fetches one record by the `id` param.
    pub fn get(&self, params: Params) -> Pending<Instance> {
        self.start(GET, params, None, Instance::empty(&self.name))
    }

    pub fn create(&self, data: Value) -> Pending<Instance> {
        let placeholder = Instance::from_value(&self.name, data.clone());
        self.start(CREATE, Params::new(), Some(data), placeholder)
    }

    /// Inserts the instance when it has no id yet, replaces it otherwise. The
    /// instance is updated in place with what the server returns.
    pub fn save(&self, instance: &Shared<Instance>) -> Pending<Instance> {
        let (id, body) = {
            let record = instance.read();
            if !record.is_instance_of(self) {
                let error = SdkError::InvalidArgument(format!(
                    "cannot save a {} instance through {}",
                    record.model(),
                    self.name
                ));
                drop(record);
                return Pending::failed(instance.clone(), error);
            }
            (record.id().cloned(), record.to_value())
        };
        let (action, params) = match id {
            Some(id) => {
                let mut params = Params::new();
                params.insert("id".to_string(), id);
                (
                    Arc::new(ActionDef::new(SAVE, HttpVerb::Put, "/:id").instance()),
                    params,
                )
            }
            None => match self.actions.get(SAVE) {
                Some(action) => (Arc::clone(action), Params::new()),
                None => return Pending::failed(instance.clone(), self.unknown(SAVE)),
            },
        };
        debug!(model = %self.name, update = action.verb == HttpVerb::Put, "Saving instance");
        let call = Call::new(action, &self.name, &self.base_path)
            .params(params)
            .body(body);
        self.dispatcher.invoke(call, instance.clone())
    }

    /// Starts any static action by name, with the shape it declares.
    pub fn invoke(&self, name: &str, params: Params, body: Option<Value>) -> Result<Invocation> {
        let action = self.actions.get(name).ok_or_else(|| self.unknown(name))?;
        if action.scope == ActionScope::Instance {
            return Err(SdkError::InvalidArgument(format!(
                "{name} is an instance action of {}",
                self.name
            )));
        }
        match name {
            LOGIN => Ok(Invocation::Object(self.login(params, body.unwrap_or(Value::Null))?)),
            LOGOUT => Ok(Invocation::Empty(self.logout()?)),
            GET_CURRENT => Ok(Invocation::Object(self.get_current()?)),
            _ => Ok(match action.returns {
                ReturnShape::Object => {
                    Invocation::Object(self.start(name, params, body, Instance::empty(&self.name)))
                }
                ReturnShape::Collection => {
                    Invocation::Collection(self.start(name, params, body, Collection::new()))
                }
                ReturnShape::Empty => Invocation::Empty(self.start(name, params, body, ())),
            }),
        }
    }

    /// Logs in with `credentials`. A `rememberMe` param (or credential field)
    /// set to `false` keeps the session out of the durable tier.
    pub fn login(&self, mut params: Params, credentials: Value) -> Result<Pending<Instance>> {
        let action = self.user_action(LOGIN)?;
        let mut credentials = credentials;
        let from_body = credentials
            .as_object_mut()
            .and_then(|fields| fields.remove(REMEMBER_ME));
        let remember_me = params
            .remove(REMEMBER_ME)
            .or(from_body)
            .map_or(true, |value| value != Value::Bool(false));

        let call = Call::new(action, ACCESS_TOKEN_MODEL, &self.base_path)
            .params(params)
            .body(credentials)
            .effect(SessionEffect::Login { remember_me });
        Ok(self
            .dispatcher
            .invoke(call, Shared::new(Instance::empty(ACCESS_TOKEN_MODEL))))
    }

    /// Logs out. The local credential is gone even if the server call fails.
    pub fn logout(&self) -> Result<Pending<()>> {
        let action = self.user_action(LOGOUT)?;
        let call = Call::new(action, &self.name, &self.base_path).effect(SessionEffect::Logout);
        Ok(self.dispatcher.invoke(call, Shared::new(())))
    }

    /// Fetches the logged-in user. Fails locally with a 401 when nobody is.
    pub fn get_current(&self) -> Result<Pending<Instance>> {
        let action = self.user_action(GET_CURRENT)?;
        let mut params = Params::new();
        if let Some(id) = self.current_id() {
            params.insert("id".to_string(), Value::String(id));
        }
        let call = Call::new(action, &self.name, &self.base_path)
            .params(params)
            .effect(SessionEffect::CurrentUser);
        Ok(self
            .dispatcher
            .invoke(call, Shared::new(Instance::empty(&self.name))))
    }

    /// The last user record seen for the current session, without a request.
    pub fn cached_current(&self) -> Option<Instance> {
        self.dispatcher
            .session()
            .current_user_data()
            .map(|user| Instance::from_value(&self.name, user))
    }

    pub fn is_authenticated(&self) -> bool {
        self.dispatcher.session().is_authenticated()
    }

    pub fn current_id(&self) -> Option<String> {
        self.dispatcher
            .session()
            .credential()
            .current_user_id()
            .map(str::to_owned)
    }

    fn start<T: Settle>(
        &self,
        name: &str,
        params: Params,
        body: Option<Value>,
        placeholder: T,
    ) -> Pending<T> {
        let placeholder = Shared::new(placeholder);
        let Some(action) = self.actions.get(name) else {
            return Pending::failed(placeholder, self.unknown(name));
        };
        let mut call = Call::new(Arc::clone(action), &self.name, &self.base_path).params(params);
        if let Some(body) = body {
            call = call.body(body);
        }
        self.dispatcher.invoke(call, placeholder)
    }

    fn user_action(&self, name: &str) -> Result<Arc<ActionDef>> {
        match self.actions.get(name) {
            Some(action) if self.user_model => Ok(Arc::clone(action)),
            _ => Err(self.unknown(name)),
        }
    }

    fn unknown(&self, name: &str) -> SdkError {
        SdkError::UnknownAction {
            model: self.name.clone(),
            action: name.to_string(),
        }
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("actions", &self.action_names())
            .field("relations", &self.relations)
            .finish()
    }
}
