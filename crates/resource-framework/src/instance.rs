//! Records returned by generated resources.
//!
//! Every [`Instance`] carries the name of the resource type that produced it.
//! The tag comes from the generator, never from the payload, so a record
//! created through a relation is tagged with the relation's target model.

use crate::resource::ResourceType;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A model record: its fields plus the resource type it belongs to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    model: String,
    fields: Map<String, Value>,
}

/// Results of collection-returning actions.
pub type Collection = Vec<Instance>;

impl Instance {
    pub fn new(model: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            model: model.into(),
            fields,
        }
    }

    pub fn empty(model: impl Into<String>) -> Self {
        Self::new(model, Map::new())
    }

    /// Builds an instance from a JSON object. Non-object values yield no fields.
    pub fn from_value(model: impl Into<String>, value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(model, fields),
            _ => Self::empty(model),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// The record id, absent until the server has assigned one.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get("id").filter(|id| !id.is_null())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// True when `resource` produced this instance.
    pub fn is_instance_of(&self, resource: &ResourceType) -> bool {
        self.model == resource.name()
    }

    /// True when this instance is tagged with `resource` and carries every
    /// required property.
    pub fn conforms_to(&self, resource: &ResourceType) -> bool {
        self.is_instance_of(resource)
            && resource
                .properties()
                .iter()
                .filter(|(_, def)| def.required)
                .all(|(name, _)| self.get(name).is_some_and(|value| !value.is_null()))
    }

    /// Replaces every field in place, keeping the handle identity.
    pub(crate) fn replace(&mut self, model: &str, fields: Map<String, Value>) {
        self.model = model.to_string();
        self.fields = fields;
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
