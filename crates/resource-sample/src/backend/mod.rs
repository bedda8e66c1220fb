//! # In-Process REST Backend
//!
//! A small LoopBack-style backend that runs as an actor behind a
//! [`ChannelTransport`]. It owns one record table per model and answers the
//! routes the generated resources call, so the sample and its tests exercise
//! the whole client stack without a network.
//!
//! ## Routes
//!
//! | Method | Path | Meaning |
//! |--------|------|---------|
//! | `GET` | `/<plural>` | List, with an optional `filter={"where":{..}}` |
//! | `POST` | `/<plural>` | Create |
//! | `GET` / `PUT` / `DELETE` | `/<plural>/:id` | Read, merge-update, delete |
//! | `POST` | `/<plural>/login` | Issue an access token (user model) |
//! | `POST` | `/<plural>/logout` | Revoke the caller's token (user model) |
//! | `GET` / `POST` / `DELETE` | `/<plural>/:id/<relation>` | Relation scoped calls |
//!
//! When the application enables authentication, the user model is protected:
//! anyone may create an account or log in, listing users is refused, and a
//! user record (and its relations) is visible only to that user's token.
//!
//! Like the actors in the framework it is modeled on, the backend processes
//! one request at a time and owns its tables outright, so no locking is needed.

use resource_framework::descriptor::normalize_name;
use resource_framework::{
    AppDescriptor, ChannelTransport, HttpRequest, HttpResponse, ModelDescriptor,
    RelationDescriptor, RelationKind, TransportRequest,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Record = Map<String, Value>;

/// Table the issued tokens are kept in.
pub const ACCESS_TOKEN_TABLE: &str = "AccessToken";

/// Two weeks, in seconds.
const TOKEN_TTL: u64 = 1_209_600;

/// Why the backend refused a request. Rendered as a LoopBack error body.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("Authorization Required")]
    Unauthorized,

    #[error("login failed")]
    LoginFailed,

    #[error("Unknown \"{model}\" id \"{id}\".")]
    NotFound { model: String, id: String },

    #[error("There is no method to handle {method} {path}")]
    NoRoute { method: String, path: String },

    #[error("The `{model}` instance is not valid. Details: `{property}` can't be blank.")]
    Invalid { model: String, property: String },

    #[error("Invalid filter: {0}")]
    BadFilter(String),
}

impl RouteError {
    pub fn status(&self) -> u16 {
        match self {
            RouteError::Unauthorized | RouteError::LoginFailed => 401,
            RouteError::NotFound { .. } | RouteError::NoRoute { .. } => 404,
            RouteError::Invalid { .. } => 422,
            RouteError::BadFilter(_) => 400,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RouteError::Unauthorized => "AUTHORIZATION_REQUIRED",
            RouteError::LoginFailed => "LOGIN_FAILED",
            RouteError::NotFound { .. } => "MODEL_NOT_FOUND",
            RouteError::NoRoute { .. } => "NOT_FOUND",
            RouteError::Invalid { .. } => "VALIDATION_FAILED",
            RouteError::BadFilter(_) => "INVALID_FILTER",
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let status = self.status();
        let name = match self {
            RouteError::Invalid { .. } => "ValidationError",
            _ => "Error",
        };
        let body = ErrorBody {
            name,
            status,
            status_code: status,
            code: self.code(),
            message: self.to_string(),
        };
        HttpResponse::json(status, json!({ "error": body }))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    name: &'static str,
    status: u16,
    status_code: u16,
    code: &'static str,
    message: String,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    last_id: u64,
}

impl Table {
    /// Stores `record`, assigning the next numeric id unless it carries one.
    fn insert(&mut self, mut record: Record) -> Record {
        if record.get("id").map_or(true, Value::is_null) {
            self.last_id += 1;
            record.insert("id".to_string(), json!(self.last_id));
        }
        self.rows.push(record.clone());
        record
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get("id").is_some_and(|value| id_text(value) == id))
    }

    fn find(&self, id: &str) -> Option<&Record> {
        self.position(id).map(|index| &self.rows[index])
    }
}

/// The backend actor: the server half of a [`ChannelTransport`].
pub struct Backend {
    receiver: mpsc::Receiver<TransportRequest>,
    descriptor: AppDescriptor,
    rest_api_root: String,
    auth_header: String,
    tables: HashMap<String, Table>,
    tokens_issued: u64,
}

impl Backend {
    /// Creates the backend and the transport that talks to it.
    ///
    /// Access tokens are read from the `auth_header` request header. The
    /// backend must be driven with [`Backend::run`]; it stops once every
    /// clone of the transport is dropped.
    pub fn new(
        descriptor: AppDescriptor,
        rest_api_root: &str,
        auth_header: &str,
        buffer_size: usize,
    ) -> (Self, ChannelTransport) {
        let (transport, receiver) = ChannelTransport::channel(buffer_size);
        let backend = Self {
            receiver,
            descriptor,
            rest_api_root: rest_api_root.trim_end_matches('/').to_string(),
            auth_header: auth_header.to_ascii_lowercase(),
            tables: HashMap::new(),
            tokens_issued: 0,
        };
        (backend, transport)
    }

    pub async fn run(mut self) {
        let app = self.descriptor.name.clone().unwrap_or_else(|| "default".into());
        info!(app = %app, models = self.descriptor.models.len(), "Backend started");

        while let Some(TransportRequest {
            request,
            respond_to,
        }) = self.receiver.recv().await
        {
            debug!(method = %request.method, path = %request.path, "Request");
            let response = match self.route(&request) {
                Ok(response) => {
                    info!(
                        method = %request.method,
                        path = %request.path,
                        status = response.status,
                        "Handled"
                    );
                    response
                }
                Err(e) => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        status = e.status(),
                        error = %e,
                        "Rejected"
                    );
                    e.into_response()
                }
            };
            let _ = respond_to.send(Ok(response));
        }

        info!(app = %app, tables = self.tables.len(), "Backend shutdown");
    }

    fn route(&mut self, request: &HttpRequest) -> Result<HttpResponse, RouteError> {
        let relative = request
            .path
            .strip_prefix(self.rest_api_root.as_str())
            .ok_or_else(|| no_route(request))?;
        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        let Some((plural, rest)) = segments.split_first() else {
            return Err(no_route(request));
        };
        let model = self
            .descriptor
            .models
            .iter()
            .find(|model| model.rest_plural() == *plural)
            .cloned()
            .ok_or_else(|| no_route(request))?;

        let protected = self.descriptor.enable_auth && model.is_user_model();
        let caller = self.caller(request);

        match (request.method.as_str(), rest) {
            ("GET", []) if protected => Err(RouteError::Unauthorized),
            ("GET", []) => self.list(&model, request),
            ("POST", []) => self.create(&model, body(request)),
            ("POST", ["login"]) if protected => self.login(&model, request),
            ("POST", ["logout"]) if protected => self.logout(caller),
            ("GET", [id]) => {
                authorize(protected, caller.as_ref(), id)?;
                self.get(&model, id)
            }
            ("PUT", [id]) => {
                authorize(protected, caller.as_ref(), id)?;
                self.update(&model, id, body(request))
            }
            ("DELETE", [id]) => {
                authorize(protected, caller.as_ref(), id)?;
                self.delete(&model, id)
            }
            (_, [id, name]) => {
                authorize(protected, caller.as_ref(), id)?;
                let relation = model
                    .relations
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| no_route(request))?;
                self.relation(request, &model, id, name, &relation)
            }
            _ => Err(no_route(request)),
        }
    }

    // --- Sessions ---

    /// The caller's token and user id, when the request carries a live token.
    fn caller(&self, request: &HttpRequest) -> Option<(String, String)> {
        let token = request.header(&self.auth_header)?;
        let row = self.tables.get(ACCESS_TOKEN_TABLE)?.find(token)?;
        let user_id = row.get("userId").map(id_text)?;
        Some((token.to_string(), user_id))
    }

    fn login(
        &mut self,
        model: &ModelDescriptor,
        request: &HttpRequest,
    ) -> Result<HttpResponse, RouteError> {
        let credentials = body(request);
        let email = credentials.get("email").ok_or(RouteError::LoginFailed)?;
        let user = self
            .rows(&model.normalized_name())
            .iter()
            .find(|row| {
                row.get("email") == Some(email)
                    && row.get("password") == credentials.get("password")
            })
            .cloned()
            .ok_or(RouteError::LoginFailed)?;

        self.tokens_issued += 1;
        let mut token = Record::new();
        token.insert("id".into(), json!(format!("token-{}", self.tokens_issued)));
        token.insert("ttl".into(), json!(TOKEN_TTL));
        token.insert("userId".into(), user.get("id").cloned().unwrap_or(Value::Null));
        let mut issued = self.table(ACCESS_TOKEN_TABLE).insert(token);
        info!(user_id = %issued.get("userId").map(id_text).unwrap_or_default(), "Token issued");

        if request.query_param("include") == Some("user") {
            issued.insert("user".into(), public(&user));
        }
        Ok(HttpResponse::json(200, Value::Object(issued)))
    }

    fn logout(&mut self, caller: Option<(String, String)>) -> Result<HttpResponse, RouteError> {
        let (token, user_id) = caller.ok_or(RouteError::Unauthorized)?;
        let tokens = self.table(ACCESS_TOKEN_TABLE);
        if let Some(index) = tokens.position(&token) {
            tokens.rows.remove(index);
        }
        info!(user_id = %user_id, "Token revoked");
        Ok(HttpResponse::new(204, Value::Null))
    }

    // --- Records ---

    fn list(
        &self,
        model: &ModelDescriptor,
        request: &HttpRequest,
    ) -> Result<HttpResponse, RouteError> {
        let conditions = where_clause(request)?;
        let rows = self
            .rows(&model.normalized_name())
            .iter()
            .filter(|row| satisfies(row, conditions.as_ref()))
            .map(public)
            .collect();
        Ok(HttpResponse::json(200, Value::Array(rows)))
    }

    fn create(
        &mut self,
        model: &ModelDescriptor,
        record: Record,
    ) -> Result<HttpResponse, RouteError> {
        validate(model, &record)?;
        let created = self.table(&model.normalized_name()).insert(record);
        Ok(HttpResponse::json(200, public(&created)))
    }

    fn get(&self, model: &ModelDescriptor, id: &str) -> Result<HttpResponse, RouteError> {
        self.get_row(&model.normalized_name(), id)
    }

    /// Merges `changes` into the stored record, keeping its id.
    fn update(
        &mut self,
        model: &ModelDescriptor,
        id: &str,
        changes: Record,
    ) -> Result<HttpResponse, RouteError> {
        let name = model.normalized_name();
        let table = self.table(&name);
        let index = table.position(id).ok_or_else(|| not_found(&name, id))?;

        let mut merged = table.rows[index].clone();
        let stored_id = merged.get("id").cloned();
        merged.extend(changes);
        if let Some(stored_id) = stored_id {
            merged.insert("id".into(), stored_id);
        }
        validate(model, &merged)?;

        table.rows[index] = merged.clone();
        Ok(HttpResponse::json(200, public(&merged)))
    }

    fn delete(&mut self, model: &ModelDescriptor, id: &str) -> Result<HttpResponse, RouteError> {
        let name = model.normalized_name();
        let table = self.table(&name);
        let index = table.position(id).ok_or_else(|| not_found(&name, id))?;
        table.rows.remove(index);
        Ok(HttpResponse::json(200, json!({ "count": 1 })))
    }

    // --- Relations ---

    fn relation(
        &mut self,
        request: &HttpRequest,
        owner: &ModelDescriptor,
        owner_id: &str,
        name: &str,
        relation: &RelationDescriptor,
    ) -> Result<HttpResponse, RouteError> {
        let owner_name = owner.normalized_name();
        let owner_row = self
            .tables
            .get(&owner_name)
            .and_then(|table| table.find(owner_id))
            .cloned()
            .ok_or_else(|| not_found(&owner_name, owner_id))?;
        let owner_key = owner_row.get("id").cloned().unwrap_or(Value::Null);
        let target = normalize_name(&relation.model);
        let foreign_key = relation.resolved_foreign_key(&owner.name, name);

        match (relation.kind, request.method.as_str()) {
            (RelationKind::BelongsTo, "GET") => {
                let target_id = owner_row
                    .get(&foreign_key)
                    .filter(|value| !value.is_null())
                    .map(id_text)
                    .ok_or_else(|| not_found(&target, "null"))?;
                self.get_row(&target, &target_id)
            }
            (RelationKind::HasOne, "GET") => self
                .rows(&target)
                .iter()
                .find(|row| row.get(&foreign_key) == Some(&owner_key))
                .map(|row| HttpResponse::json(200, public(row)))
                .ok_or_else(|| not_found(&target, owner_id)),
            (RelationKind::HasMany, "GET") => {
                let rows = self
                    .rows(&target)
                    .iter()
                    .filter(|row| row.get(&foreign_key) == Some(&owner_key))
                    .map(public)
                    .collect();
                Ok(HttpResponse::json(200, Value::Array(rows)))
            }
            (RelationKind::HasOne | RelationKind::HasMany, "POST") => {
                let mut record = body(request);
                record.insert(foreign_key, owner_key);
                self.create_target(relation, &target, record)
            }
            (RelationKind::HasMany, "DELETE") => {
                self.table(&target)
                    .rows
                    .retain(|row| row.get(&foreign_key) != Some(&owner_key));
                Ok(HttpResponse::new(204, Value::Null))
            }
            (kind, method) if kind.uses_through() => {
                let through = relation
                    .resolved_through(&owner.name)
                    .map(|through| normalize_name(&through))
                    .ok_or_else(|| no_route(request))?;
                let target_key = relation.target_key();
                let linked: Vec<String> = self
                    .rows(&through)
                    .iter()
                    .filter(|link| link.get(&foreign_key) == Some(&owner_key))
                    .filter_map(|link| link.get(&target_key).map(id_text))
                    .collect();

                match method {
                    "GET" => {
                        let rows = linked
                            .iter()
                            .filter_map(|id| self.tables.get(&target)?.find(id))
                            .map(public)
                            .collect();
                        Ok(HttpResponse::json(200, Value::Array(rows)))
                    }
                    "POST" => {
                        let response = self.create_target(relation, &target, body(request))?;
                        let mut link = Record::new();
                        link.insert(foreign_key, owner_key);
                        link.insert(target_key, response.body["id"].clone());
                        self.table(&through).insert(link);
                        Ok(response)
                    }
                    "DELETE" => {
                        self.table(&target)
                            .rows
                            .retain(|row| {
                                !row.get("id").is_some_and(|id| linked.contains(&id_text(id)))
                            });
                        self.table(&through)
                            .rows
                            .retain(|link| link.get(&foreign_key) != Some(&owner_key));
                        Ok(HttpResponse::new(204, Value::Null))
                    }
                    _ => Err(no_route(request)),
                }
            }
            _ => Err(no_route(request)),
        }
    }

    fn create_target(
        &mut self,
        relation: &RelationDescriptor,
        target: &str,
        record: Record,
    ) -> Result<HttpResponse, RouteError> {
        if let Some(model) = self.descriptor.find_model(&relation.model) {
            validate(model, &record)?;
        }
        let created = self.table(target).insert(record);
        Ok(HttpResponse::json(200, public(&created)))
    }

    // --- Tables ---

    fn rows(&self, model: &str) -> &[Record] {
        self.tables
            .get(model)
            .map(|table| table.rows.as_slice())
            .unwrap_or(&[])
    }

    fn table(&mut self, model: &str) -> &mut Table {
        self.tables.entry(model.to_string()).or_default()
    }

    fn get_row(&self, model: &str, id: &str) -> Result<HttpResponse, RouteError> {
        self.tables
            .get(model)
            .and_then(|table| table.find(id))
            .map(|row| HttpResponse::json(200, public(row)))
            .ok_or_else(|| not_found(model, id))
    }
}

fn authorize(
    protected: bool,
    caller: Option<&(String, String)>,
    id: &str,
) -> Result<(), RouteError> {
    match caller {
        _ if !protected => Ok(()),
        Some((_, user_id)) if user_id == id => Ok(()),
        _ => Err(RouteError::Unauthorized),
    }
}

fn validate(model: &ModelDescriptor, record: &Record) -> Result<(), RouteError> {
    match model
        .properties
        .iter()
        .find(|(name, def)| def.required && record.get(*name).map_or(true, Value::is_null))
    {
        Some((property, _)) => Err(RouteError::Invalid {
            model: model.normalized_name(),
            property: property.clone(),
        }),
        None => Ok(()),
    }
}

fn where_clause(request: &HttpRequest) -> Result<Option<Record>, RouteError> {
    let Some(text) = request.query_param("filter") else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(filter)) => Ok(filter.get("where").and_then(Value::as_object).cloned()),
        Ok(other) => Err(RouteError::BadFilter(other.to_string())),
        Err(e) => Err(RouteError::BadFilter(e.to_string())),
    }
}

fn satisfies(row: &Record, conditions: Option<&Record>) -> bool {
    conditions.map_or(true, |conditions| {
        conditions
            .iter()
            .all(|(key, expected)| row.get(key) == Some(expected))
    })
}

fn body(request: &HttpRequest) -> Record {
    match &request.body {
        Some(Value::Object(fields)) => fields.clone(),
        _ => Record::new(),
    }
}

/// A record as the API shows it: passwords never leave the backend.
fn public(record: &Record) -> Value {
    let mut shown = record.clone();
    shown.remove("password");
    Value::Object(shown)
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn not_found(model: &str, id: &str) -> RouteError {
    RouteError::NotFound {
        model: model.to_string(),
        id: id.to_string(),
    }
}

fn no_route(request: &HttpRequest) -> RouteError {
    RouteError::NoRoute {
        method: request.method.to_string(),
        path: request.path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{auth_app, catalog_app, my_model_app};
    use resource_framework::{Method, Transport};

    fn spawn(descriptor: AppDescriptor) -> ChannelTransport {
        let (backend, transport) = Backend::new(descriptor, "/api", "authorization", 16);
        tokio::spawn(backend.run());
        transport
    }

    fn post(path: &str, body: Value) -> HttpRequest {
        let mut request = HttpRequest::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    #[tokio::test]
    async fn test_create_then_list_with_filter() {
        let transport = spawn(my_model_app());
        transport.send(post("/api/MyModels", json!({ "name": "a" }))).await.unwrap();
        let created = transport.send(post("/api/MyModels", json!({ "name": "b" }))).await.unwrap();
        assert_eq!(created.body, json!({ "id": 2, "name": "b" }));
        assert!(created.headers.contains_key("content-type"));

        let mut list = HttpRequest::new(Method::GET, "/api/MyModels");
        list.query.push(("filter".into(), r#"{"where":{"name":"b"}}"#.into()));
        let found = transport.send(list).await.unwrap();
        assert_eq!(found.body, json!([{ "id": 2, "name": "b" }]));
    }

    #[tokio::test]
    async fn test_missing_required_property_is_rejected() {
        let transport = spawn(my_model_app());
        let response = transport.send(post("/api/MyModels", json!({}))).await.unwrap();
        assert_eq!(response.status, 422);
        assert_eq!(response.body["error"]["name"], "ValidationError");
    }

    #[tokio::test]
    async fn test_update_merges_into_stored_record() {
        let transport = spawn(my_model_app());
        transport.send(post("/api/MyModels", json!({ "name": "a" }))).await.unwrap();

        let mut update = HttpRequest::new(Method::PUT, "/api/MyModels/1");
        update.body = Some(json!({ "updated": true }));
        let response = transport.send(update).await.unwrap();
        assert_eq!(response.body, json!({ "id": 1, "name": "a", "updated": true }));

        let missing = transport
            .send(HttpRequest::new(Method::GET, "/api/MyModels/9"))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn test_user_routes_require_the_owners_token() {
        let transport = spawn(auth_app().unwrap());
        let credentials = json!({ "email": "a@example.com", "password": "pass" });
        transport.send(post("/api/users", credentials.clone())).await.unwrap();

        let listed = transport.send(HttpRequest::new(Method::GET, "/api/users")).await.unwrap();
        assert_eq!(listed.status, 401);
        assert_eq!(listed.body["error"]["message"], "Authorization Required");

        let mut login = post("/api/users/login", credentials);
        login.query.push(("include".into(), "user".into()));
        let token = transport.send(login).await.unwrap();
        assert_eq!(token.body["userId"], 1);
        assert_eq!(token.body["user"]["email"], "a@example.com");
        assert!(token.body["user"].get("password").is_none());

        let mut get = HttpRequest::new(Method::GET, "/api/users/1");
        let anonymous = transport.send(get.clone()).await.unwrap();
        assert_eq!(anonymous.status, 401);

        let token_id = token.body["id"].as_str().unwrap().to_string();
        get.headers.insert("authorization", token_id.parse().unwrap());
        let own = transport.send(get.clone()).await.unwrap();
        assert_eq!(own.status, 200);

        let mut logout = HttpRequest::new(Method::POST, "/api/users/logout");
        logout.headers = get.headers.clone();
        assert_eq!(transport.send(logout).await.unwrap().status, 204);
        assert_eq!(transport.send(get).await.unwrap().status, 401);
    }

    #[tokio::test]
    async fn test_wrong_password_fails_login() {
        let transport = spawn(auth_app().unwrap());
        transport
            .send(post("/api/users", json!({ "email": "a@example.com", "password": "pass" })))
            .await
            .unwrap();
        let response = transport
            .send(post("/api/users/login", json!({ "email": "a@example.com", "password": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(response.body["error"]["code"], "LOGIN_FAILED");
    }

    #[tokio::test]
    async fn test_has_and_belongs_to_many_links_both_ways() {
        let transport = spawn(catalog_app());
        transport.send(post("/api/Products", json!({ "name": "p1" }))).await.unwrap();
        let category = transport
            .send(post("/api/Products/1/categories", json!({ "name": "c1" })))
            .await
            .unwrap();
        assert_eq!(category.body["id"], 1);

        let categories = transport
            .send(HttpRequest::new(Method::GET, "/api/Products/1/categories"))
            .await
            .unwrap();
        assert_eq!(categories.body, json!([{ "id": 1, "name": "c1" }]));

        let products = transport
            .send(HttpRequest::new(Method::GET, "/api/Categories/1/products"))
            .await
            .unwrap();
        assert_eq!(products.body, json!([{ "id": 1, "name": "p1" }]));

        let cleared = transport
            .send(HttpRequest::new(Method::DELETE, "/api/Products/1/categories"))
            .await
            .unwrap();
        assert_eq!(cleared.status, 204);
        let after = transport
            .send(HttpRequest::new(Method::GET, "/api/Products/1/categories"))
            .await
            .unwrap();
        assert_eq!(after.body, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let transport = spawn(my_model_app());
        let response = transport
            .send(HttpRequest::new(Method::GET, "/api/Nothings"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["code"], "NOT_FOUND");
    }
}
