use resource_framework::mock::MockTransport;
use resource_framework::{
    params, AppDescriptor, Application, HttpTransport, Method, ModelDescriptor, RelationDescriptor,
    RelationKind, SdkConfig, SdkError, SessionStore,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// --- Descriptors ---

fn auth_app() -> AppDescriptor {
    AppDescriptor::new()
        .named("with authentication")
        .enable_auth()
        .model(ModelDescriptor::new("user").base("User"))
        .model(ModelDescriptor::new("product"))
}

fn application(mock: &MockTransport, store: &SessionStore) -> Application {
    Application::new(&auth_app(), &SdkConfig::default(), store.clone(), mock.transport())
        .expect("valid descriptor")
}

/// Login, current user and logout against scripted responses.
#[tokio::test]
async fn test_session_round_trip_with_mock_transport() {
    let mut mock = MockTransport::new();
    mock.expect(Method::POST, "/api/users/login").respond(
        200,
        json!({ "id": "token-1", "userId": 1, "user": { "id": 1, "email": "a@example.com" } }),
    );
    mock.expect(Method::GET, "/api/users/1")
        .respond(200, json!({ "id": 1, "email": "a@example.com" }));
    mock.expect(Method::POST, "/api/users/logout")
        .respond_with(resource_framework::HttpResponse::new(204, serde_json::Value::Null));

    let store = SessionStore::in_memory();
    let app = application(&mock, &store);
    let user = app.resource("User").unwrap();

    // Logged out: answered locally
    let err = user.get_current().unwrap().await.unwrap_err();
    assert!(err.is_stub());

    user.login(params(json!({})), json!({ "email": "a@example.com", "password": "pass" }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(user.cached_current().unwrap().get("email"), Some(&json!("a@example.com")));

    let current = user.get_current().unwrap().await.unwrap();
    assert_eq!(current.id(), Some(&json!(1)));
    assert!(current.is_instance_of(&user));

    user.logout().unwrap().await.unwrap();
    assert!(!user.is_authenticated());
    assert_eq!(user.current_id(), None);
    assert!(user.cached_current().is_none());

    let requests = mock.received();
    assert_eq!(requests[1].header("authorization"), Some("token-1"));
    assert_eq!(requests[2].header("authorization"), Some("token-1"));
    mock.verify();
}

/// A second application over the same store sees the remembered session.
#[tokio::test]
async fn test_remembered_session_survives_new_application() {
    let mut mock = MockTransport::new();
    mock.expect(Method::POST, "/api/users/login")
        .respond(200, json!({ "id": "token-1", "userId": 7 }));
    let store = SessionStore::in_memory();

    let first = application(&mock, &store);
    first
        .resource("user")
        .unwrap()
        .login(params(json!({ "rememberMe": true })), json!({ "email": "a", "password": "b" }))
        .unwrap()
        .await
        .unwrap();

    let restarted = application(&mock, &store);
    let credential = restarted.session().credential();
    assert_eq!(credential.access_token_id(), Some("token-1"));
    assert_eq!(credential.current_user_id(), Some("7"));
    assert!(credential.remember_me());
    mock.verify();
}

/// Relation accessors appear only where declared and use the owner id.
#[tokio::test]
async fn test_relation_scoped_calls() {
    let mut mock = MockTransport::new();
    mock.expect(Method::GET, "/api/products/1/categories")
        .respond(200, json!([{ "id": 2, "name": "a-cat" }]));

    let app = Application::new(
        &AppDescriptor::new()
            .model(
                ModelDescriptor::new("product").relation(
                    "categories",
                    RelationDescriptor::new(RelationKind::HasAndBelongsToMany, "category"),
                ),
            )
            .model(ModelDescriptor::new("category")),
        &SdkConfig::default(),
        SessionStore::in_memory(),
        mock.transport(),
    )
    .unwrap();

    let product = app.resource("Product").unwrap();
    let category = app.resource("Category").unwrap();
    assert!(product.keys().contains(&"categories"));
    assert!(category.relation("products").is_err());

    let categories = product
        .relation("categories")
        .unwrap()
        .list(1, params(json!({})))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(categories.len(), 1);
    assert!(categories[0].is_instance_of(&category));
    mock.verify();
}

/// The reqwest transport against a real HTTP server.
#[tokio::test]
async fn test_http_transport_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/MyModels"))
        .and(body_json(json!({ "name": "new" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "new" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/MyModels"))
        .and(query_param("filter", r#"{"where":{"name":"new"}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "new" }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(header("authorization", "token-9"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "Authorization Required" } })),
        )
        .mount(&server)
        .await;

    let config = SdkConfig {
        base_url: server.uri(),
        ..SdkConfig::default()
    };
    let store = SessionStore::in_memory();
    let app = Application::new(
        &AppDescriptor::new()
            .enable_auth()
            .model(ModelDescriptor::new("MyModel"))
            .model(ModelDescriptor::new("user").base("User")),
        &config,
        store,
        Arc::new(HttpTransport::new(&config).unwrap()),
    )
    .unwrap();

    let my_model = app.resource("MyModel").unwrap();
    let created = my_model.create(json!({ "name": "new" })).await.unwrap();
    assert_eq!(created.id(), Some(&json!(1)));

    let found = my_model
        .find(params(json!({ "filter": { "where": { "name": "new" } } })))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    // A stale token is rejected by the server and dropped locally
    app.session().set_credential("token-9", "9", false);
    let err = app
        .resource("User")
        .unwrap()
        .query(params(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(err.headers().is_some());
    assert!(!app.session().is_authenticated());
    assert!(matches!(
        err,
        SdkError::Http(ref failure) if failure.message == "Authorization Required"
    ));
}
