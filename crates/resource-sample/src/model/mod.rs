//! # Sample Model Sets
//!
//! Application descriptors used by the demo and the end-to-end tests. Each one
//! is what metadata discovery would report for a small backend.

use resource_framework::{
    AppDescriptor, ModelDescriptor, PropertyDef, PropertyType, RelationDescriptor, RelationKind,
    Result,
};

/// A single model with one required property.
pub fn my_model_app() -> AppDescriptor {
    AppDescriptor::new().model(
        ModelDescriptor::new("MyModel")
            .property("name", PropertyDef::new(PropertyType::String).required()),
    )
}

/// A model whose name is not a valid identifier.
pub fn funky_name_app() -> AppDescriptor {
    AppDescriptor::new().model(ModelDescriptor::new("lower-case-not-an-identifier"))
}

const AUTH_APP: &str = r#"{
    "name": "with authentication",
    "enableAuth": true,
    "models": [
        {
            "name": "user",
            "base": "User",
            "properties": {
                "email": { "type": "string", "required": true },
                "password": { "type": "string", "required": true }
            },
            "relations": {
                "accessTokens": {
                    "model": "AccessToken",
                    "type": "hasMany",
                    "foreignKey": "userId"
                }
            }
        },
        {
            "name": "product",
            "properties": { "model": { "type": "string" } }
        }
    ]
}"#;

/// A user model with login support next to an unrelated model, as discovery
/// reports it in JSON.
pub fn auth_app() -> Result<AppDescriptor> {
    AppDescriptor::from_json(AUTH_APP)
}

/// Products and categories linked both ways through `hasAndBelongsToMany`.
pub fn catalog_app() -> AppDescriptor {
    AppDescriptor::new()
        .model(
            ModelDescriptor::new("Product")
                .property("name", PropertyDef::new(PropertyType::String))
                .relation(
                    "categories",
                    RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "Category"),
                ),
        )
        .model(
            ModelDescriptor::new("Category")
                .property("name", PropertyDef::new(PropertyType::String))
                .relation(
                    "products",
                    RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "Product"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_app_parses() {
        let app = auth_app().unwrap();
        assert!(app.enable_auth);
        assert_eq!(app.name.as_deref(), Some("with authentication"));
        assert!(app.find_model("User").unwrap().is_user_model());
        assert!(!app.find_model("Product").unwrap().is_user_model());
    }
}
