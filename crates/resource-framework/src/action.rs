//! # Actions
//!
//! An [`ActionDef`] is one entry of a resource's action registry: an HTTP verb,
//! a path template relative to the model's base path, and the shape of the
//! result. Templates use `:name` segments that are filled from the call
//! parameters; parameters not consumed by the template become the query string.

use crate::transport::HttpRequest;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Call parameters: path placeholders plus query-string values.
pub type Params = Map<String, Value>;

/// Turns a JSON object literal into [`Params`]. Anything else yields no params.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

pub const QUERY: &str = "query";
pub const GET: &str = "get";
pub const CREATE: &str = "create";
pub const FIND: &str = "find";
pub const SAVE: &str = "save";
pub const LOGIN: &str = "login";
pub const LOGOUT: &str = "logout";
pub const GET_CURRENT: &str = "getCurrent";

/// Names every generated resource carries.
pub const BUILTIN_ACTIONS: [&str; 5] = [QUERY, GET, CREATE, FIND, SAVE];
/// Names only the designated user model carries.
pub const USER_ACTIONS: [&str; 3] = [LOGIN, LOGOUT, GET_CURRENT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpVerb {
    pub fn method(self) -> Method {
        match self {
            HttpVerb::Get => Method::GET,
            HttpVerb::Post => Method::POST,
            HttpVerb::Put => Method::PUT,
            HttpVerb::Patch => Method::PATCH,
            HttpVerb::Delete => Method::DELETE,
            HttpVerb::Head => Method::HEAD,
        }
    }
}

/// Shape of the value an action settles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReturnShape {
    #[default]
    Object,
    Collection,
    Empty,
}

/// Whether the action is called on the resource type or on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActionScope {
    #[default]
    Static,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    pub name: String,
    pub verb: HttpVerb,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub returns: ReturnShape,
    #[serde(default)]
    pub scope: ActionScope,
    /// Answered with a local 401 stub when nobody is logged in.
    #[serde(default)]
    pub requires_current_user: bool,
    /// Parameters merged under the caller's parameters.
    #[serde(default)]
    pub default_params: Params,
}

impl ActionDef {
    pub fn new(name: impl Into<String>, verb: HttpVerb, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verb,
            path: path.into(),
            returns: ReturnShape::Object,
            scope: ActionScope::Static,
            requires_current_user: false,
            default_params: Params::new(),
        }
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn instance(mut self) -> Self {
        self.scope = ActionScope::Instance;
        self
    }

    pub fn requires_current_user(mut self) -> Self {
        self.requires_current_user = true;
        self
    }

    pub fn default_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_params.insert(name.into(), value.into());
        self
    }

    /// Builds the concrete request under `base_path`.
    ///
    /// A `filter` parameter that is not an object is dropped, so a truthy
    /// non-object filter still yields a plain collection request.
    pub fn build_request(
        &self,
        base_path: &str,
        params: Params,
        body: Option<Value>,
    ) -> HttpRequest {
        let mut merged = self.default_params.clone();
        merged.extend(params);
        if merged.get("filter").is_some_and(|filter| !filter.is_object()) {
            merged.remove("filter");
        }

        let path = format!("{}{}", base_path, render_path(&self.path, &mut merged));
        HttpRequest {
            method: self.verb.method(),
            path,
            query: encode_query(merged),
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// The built-in actions registered on every resource.
pub fn builtin_actions() -> Vec<ActionDef> {
    vec![
        ActionDef::new(QUERY, HttpVerb::Get, "").returns(ReturnShape::Collection),
        ActionDef::new(GET, HttpVerb::Get, "/:id"),
        ActionDef::new(CREATE, HttpVerb::Post, ""),
        ActionDef::new(FIND, HttpVerb::Get, "").returns(ReturnShape::Collection),
        // Upsert: POST while the instance has no id, PUT /:id afterwards.
        ActionDef::new(SAVE, HttpVerb::Post, "").instance(),
    ]
}

/// The actions registered on the designated user model when auth is enabled.
pub fn user_actions() -> Vec<ActionDef> {
    vec![
        ActionDef::new(LOGIN, HttpVerb::Post, "/login").default_param("include", "user"),
        ActionDef::new(LOGOUT, HttpVerb::Post, "/logout").returns(ReturnShape::Empty),
        ActionDef::new(GET_CURRENT, HttpVerb::Get, "/:id").requires_current_user(),
    ]
}

/// Substitutes `:name` segments, consuming the parameters they use. Segments
/// whose parameter is missing or null are dropped.
pub(crate) fn render_path(template: &str, params: &mut Params) -> String {
    let mut rendered = String::new();
    for segment in template.split('/').filter(|segment| !segment.is_empty()) {
        match segment.strip_prefix(':') {
            Some(name) => match params.remove(name) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    rendered.push('/');
                    rendered.push_str(&urlencoding::encode(&scalar_text(&value)));
                }
            },
            None => {
                rendered.push('/');
                rendered.push_str(segment);
            }
        }
    }
    rendered
}

fn encode_query(params: Params) -> Vec<(String, String)> {
    params
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name, scalar_text(&value)))
        .collect()
}

/// Strings go out verbatim; everything else as JSON text.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_template_consumes_params() {
        let action = ActionDef::new(GET, HttpVerb::Get, "/:id");
        let request =
            action.build_request("/api/MyModels", params(json!({ "id": 7, "extra": "x" })), None);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/api/MyModels/7");
        assert_eq!(request.query, vec![("extra".to_string(), "x".to_string())]);
    }

    #[test]
    fn test_missing_path_param_drops_segment() {
        let action = ActionDef::new(GET, HttpVerb::Get, "/:id");
        let request = action.build_request("/api/MyModels", Params::new(), None);
        assert_eq!(request.path, "/api/MyModels");
    }

    #[test]
    fn test_path_values_are_encoded() {
        let action = ActionDef::new(GET, HttpVerb::Get, "/:id");
        let request = action.build_request("/api/Files", params(json!({ "id": "a b/c" })), None);
        assert_eq!(request.path, "/api/Files/a%20b%2Fc");
    }

    #[test]
    fn test_filter_object_is_json_encoded() {
        let action = ActionDef::new(FIND, HttpVerb::Get, "").returns(ReturnShape::Collection);
        let request = action.build_request(
            "/api/MyModels",
            params(json!({ "filter": { "where": { "name": "new" } } })),
            None,
        );
        assert_eq!(
            request.query,
            vec![("filter".to_string(), r#"{"where":{"name":"new"}}"#.to_string())]
        );
    }

    #[test]
    fn test_truthy_non_object_filter_is_dropped() {
        let action = ActionDef::new(FIND, HttpVerb::Get, "").returns(ReturnShape::Collection);
        let request =
            action.build_request("/api/Products", params(json!({ "filter": true })), None);
        assert_eq!(request.path, "/api/Products");
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_default_params_yield_to_caller() {
        let login = &user_actions()[0];
        let request = login.build_request("/api/users", Params::new(), None);
        assert_eq!(request.path, "/api/users/login");
        assert_eq!(request.query, vec![("include".to_string(), "user".to_string())]);

        let request = login.build_request("/api/users", params(json!({ "include": "none" })), None);
        assert_eq!(request.query, vec![("include".to_string(), "none".to_string())]);
    }

    #[test]
    fn test_custom_action_from_json() {
        let action: ActionDef = serde_json::from_str(
            r#"{ "name": "greet", "verb": "POST", "path": "/:id/greet", "returns": "object" }"#,
        )
        .unwrap();
        assert_eq!(action.verb, HttpVerb::Post);
        assert_eq!(action.scope, ActionScope::Static);
        assert!(!action.requires_current_user);
    }
}
