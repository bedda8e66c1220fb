//! # Model Metadata
//!
//! Descriptors are the inbound contract from metadata discovery: one
//! [`AppDescriptor`] per application scope, holding a [`ModelDescriptor`] per
//! backend model. They deserialize from the JSON shape discovery emits and can
//! also be assembled in code with the builder methods.
//!
//! ```rust
//! use resource_framework::descriptor::{
//!     AppDescriptor, ModelDescriptor, PropertyDef, PropertyType, RelationDescriptor, RelationKind,
//! };
//!
//! let app = AppDescriptor::new()
//!     .model(ModelDescriptor::new("Product")
//!         .property("name", PropertyDef::new(PropertyType::String))
//!         .relation(
//!             "categories",
//!             RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "Category"),
//!         ))
//!     .model(ModelDescriptor::new("Category")
//!         .property("name", PropertyDef::new(PropertyType::String)));
//!
//! assert_eq!(app.models.len(), 2);
//! ```

use crate::action::ActionDef;
use crate::error::{Result, SdkError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic type of a model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    #[default]
    #[serde(other)]
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PropertyDef {
    #[serde(rename = "type", default)]
    pub ty: PropertyType,
    #[serde(default)]
    pub required: bool,
}

impl PropertyDef {
    pub fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasManyThrough,
    HasAndBelongsToMany,
}

impl RelationKind {
    /// To-many relations list a collection; to-one relations fetch a single record.
    pub fn is_to_many(self) -> bool {
        matches!(
            self,
            RelationKind::HasMany | RelationKind::HasManyThrough | RelationKind::HasAndBelongsToMany
        )
    }

    /// Relations whose association lives in a separate through model.
    pub fn uses_through(self) -> bool {
        matches!(
            self,
            RelationKind::HasManyThrough | RelationKind::HasAndBelongsToMany
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescriptor {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Target model name, as declared by the backend.
    pub model: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub through: Option<String>,
}

impl RelationDescriptor {
    pub fn new(kind: RelationKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            foreign_key: None,
            through: None,
        }
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }

    /// The declared foreign key, or the inferred one.
    ///
    /// `belongsTo` keys live on the owner and are named after the relation
    /// (`owner` → `ownerId`); every other kind keys the target (or the through
    /// model) by the owner's name (`Product` → `productId`).
    pub fn resolved_foreign_key(&self, owner: &str, relation_name: &str) -> String {
        if let Some(key) = &self.foreign_key {
            return key.clone();
        }
        match self.kind {
            RelationKind::BelongsTo => format!("{relation_name}Id"),
            _ => format!("{}Id", camel_case(owner)),
        }
    }

    /// Key of the target model inside the through model (`Category` → `categoryId`).
    pub fn target_key(&self) -> String {
        format!("{}Id", camel_case(&self.model))
    }

    /// The through model, inferred for `hasAndBelongsToMany` as the two
    /// normalized model names sorted and concatenated (`CategoryProduct`).
    pub fn resolved_through(&self, owner: &str) -> Option<String> {
        match (self.kind, &self.through) {
            (_, Some(through)) => Some(through.clone()),
            (RelationKind::HasAndBelongsToMany, None) => {
                let mut names = [normalize_name(owner), normalize_name(&self.model)];
                names.sort();
                Some(names.concat())
            }
            _ => None,
        }
    }
}

/// Metadata for one backend model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDescriptor>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            plural: None,
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.properties.insert(name.into(), def);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: RelationDescriptor) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn action(mut self, action: ActionDef) -> Self {
        self.actions.push(action);
        self
    }

    /// Name the generated resource is registered under.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// REST collection segment: the declared plural, or an English plural of
    /// the verbatim model name.
    pub fn rest_plural(&self) -> String {
        self.plural.clone().unwrap_or_else(|| pluralize(&self.name))
    }

    /// The designated user model carries the login/logout/getCurrent actions.
    pub fn is_user_model(&self) -> bool {
        self.base.as_deref() == Some("User") || self.normalized_name() == "User"
    }
}

/// All models of one application scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enable_auth: bool,
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl AppDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn enable_auth(mut self) -> Self {
        self.enable_auth = true;
        self
    }

    pub fn model(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SdkError::InvalidDescriptor(e.to_string()))
    }

    /// Finds a model by verbatim or normalized name.
    pub fn find_model(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|model| model.name == name || model.normalized_name() == name)
    }
}

/// Uppercases the first ASCII letter and keeps the rest verbatim.
///
/// The result is a lookup key, not necessarily a valid identifier:
/// `lower-case-not-an-identifier` becomes `Lower-case-not-an-identifier`.
pub fn normalize_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Lowercases the first character (`MyModel` → `myModel`).
pub fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn pluralize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{name}es");
    }
    if let Some(stem) = name.strip_suffix('y').or_else(|| name.strip_suffix('Y')) {
        let before_y = stem.chars().last();
        if before_y.is_some_and(|c| !"aeiouAEIOU".contains(c)) {
            return format!("{stem}ies");
        }
    }
    format!("{name}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_uppercases_first_letter_only() {
        assert_eq!(normalize_name("user"), "User");
        assert_eq!(normalize_name("MyModel"), "MyModel");
        assert_eq!(
            normalize_name("lower-case-not-an-identifier"),
            "Lower-case-not-an-identifier"
        );
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_rest_plural() {
        assert_eq!(ModelDescriptor::new("user").rest_plural(), "users");
        assert_eq!(ModelDescriptor::new("MyModel").rest_plural(), "MyModels");
        assert_eq!(ModelDescriptor::new("Category").rest_plural(), "Categories");
        assert_eq!(ModelDescriptor::new("Address").rest_plural(), "Addresses");
        assert_eq!(ModelDescriptor::new("Key").rest_plural(), "Keys");
        assert_eq!(
            ModelDescriptor::new("person").plural("people").rest_plural(),
            "people"
        );
    }

    #[test]
    fn test_user_model_detection() {
        assert!(ModelDescriptor::new("user").base("User").is_user_model());
        assert!(ModelDescriptor::new("User").is_user_model());
        assert!(!ModelDescriptor::new("product").is_user_model());
    }

    #[test]
    fn test_foreign_key_inference() {
        let has_many = RelationDescriptor::new(RelationKind::HasMany, "Order");
        assert_eq!(has_many.resolved_foreign_key("Customer", "orders"), "customerId");

        let belongs_to = RelationDescriptor::new(RelationKind::BelongsTo, "Customer");
        assert_eq!(belongs_to.resolved_foreign_key("Order", "owner"), "ownerId");

        let explicit =
            RelationDescriptor::new(RelationKind::HasMany, "AccessToken").foreign_key("userId");
        assert_eq!(explicit.resolved_foreign_key("user", "accessTokens"), "userId");
    }

    #[test]
    fn test_habtm_through_is_symmetric() {
        let categories = RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "Category");
        let products = RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "Product");
        assert_eq!(categories.resolved_through("Product").as_deref(), Some("CategoryProduct"));
        assert_eq!(products.resolved_through("Category").as_deref(), Some("CategoryProduct"));
        assert_eq!(categories.target_key(), "categoryId");

        let has_many = RelationDescriptor::new(RelationKind::HasMany, "Order");
        assert_eq!(has_many.resolved_through("Customer"), None);
    }

    #[test]
    fn test_app_descriptor_from_json() {
        let app = AppDescriptor::from_json(
            r#"{
                "name": "with authentication",
                "enableAuth": true,
                "models": [
                    {
                        "name": "user",
                        "base": "User",
                        "relations": {
                            "accessTokens": {
                                "model": "AccessToken",
                                "type": "hasMany",
                                "foreignKey": "userId"
                            }
                        }
                    },
                    { "name": "product", "properties": { "model": { "type": "string" } } }
                ]
            }"#,
        )
        .unwrap();

        assert!(app.enable_auth);
        let user = app.find_model("User").unwrap();
        assert!(user.is_user_model());
        assert_eq!(user.relations["accessTokens"].kind, RelationKind::HasMany);
        let product = app.find_model("product").unwrap();
        assert_eq!(product.properties["model"].ty, PropertyType::String);
    }

    #[test]
    fn test_unknown_property_type_is_any() {
        let def: PropertyDef = serde_json::from_str(r#"{ "type": "geopoint" }"#).unwrap();
        assert_eq!(def.ty, PropertyType::Any);
    }
}
