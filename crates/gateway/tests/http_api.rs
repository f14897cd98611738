//! End-to-end test against the real axum router: binds an ephemeral port,
//! drives it with `reqwest`, and exercises the login → chat → order
//! lifecycle the way an external client would.

use std::sync::Arc;

use sa_domain::config::Config;
use sa_gateway::api;
use sa_gateway::bootstrap::build_app_state;

async fn spawn_server(catalog_json: &str) -> (String, tempfile::TempDir) {
    spawn_server_with_users(catalog_json, &[("ana", "ana@example.com", "pw123456")]).await
}

async fn spawn_server_with_users(
    catalog_json: &str,
    users: &[(&str, &str, &str)],
) -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    std::fs::write(&catalog_path, catalog_json).unwrap();

    std::env::set_var("SA_GATEWAY_TEST_JWT_SECRET", "http-api-test-secret");

    let mut config = Config::default();
    config.sessions.state_path = dir.path().join("state");
    config.catalog.seed_path = catalog_path;
    config.auth.secret_env = "SA_GATEWAY_TEST_JWT_SECRET".into();
    config.server.port = 0;
    let config = Arc::new(config);

    let state = build_app_state(config.clone()).await.unwrap();
    for (username, email, password) in users {
        state
            .users
            .create(username, email, password, sa_gateway::api::auth::UserRole::Customer)
            .unwrap();
    }

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), dir)
}

const CATALOG_FIXTURE: &str = r#"{
    "products": [
        {
            "id": "p1",
            "name": "Widget",
            "barcode": "1111",
            "brand": "Acme",
            "category": "tools",
            "unit_price": 10.0,
            "final_price": 10.0,
            "available": 8,
            "active": true
        }
    ]
}"#;

#[tokio::test]
async fn health_is_public_and_returns_ok() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/v1/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_route_without_token_is_rejected() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/chat"))
        .json(&serde_json::json!({ "query": "hola" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn login_then_chat_round_trips() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let login: serde_json::Value = client
        .post(format!("{base}/api/v1/login"))
        .json(&serde_json::json!({ "username_or_email": "ana", "password": "pw123456" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap();
    assert_eq!(login["role"], 2);

    let chat: serde_json::Value = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(token)
        .json(&serde_json::json!({ "query": "hola" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(chat["answer"].as_str().is_some());
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/login"))
        .json(&serde_json::json!({ "username_or_email": "ana", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn list_products_is_public() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let products: serde_json::Value = client
        .get(format!("{base}/api/v1/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let products = products.as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["id"], "p1");
}

#[tokio::test]
async fn create_order_decrements_stock_and_issues_order_number() {
    let (base, _dir) = spawn_server(CATALOG_FIXTURE).await;
    let client = reqwest::Client::new();

    let login: serde_json::Value = client
        .post(format!("{base}/api/v1/login"))
        .json(&serde_json::json!({ "username_or_email": "ana", "password": "pw123456" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap();

    let created: serde_json::Value = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "lines": [{ "product_id": "p1", "quantity": 1 }],
            "shipping_address": "Av. Siempre Viva 742",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["ok"], true);
    let order_id = created["order"]["id"].as_str().unwrap();
    let hex: String = order_id.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let order_number = format!("ORD-{}", hex.chars().take(8).collect::<String>().to_uppercase());
    assert!(order_number.starts_with("ORD-"));
    assert_eq!(order_number.len(), 12);

    let products: serde_json::Value = client
        .get(format!("{base}/api/v1/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(products[0]["available"], 7);
}

#[tokio::test]
async fn order_is_invisible_to_a_different_customer() {
    let (base, _dir) = spawn_server_with_users(
        CATALOG_FIXTURE,
        &[("ana", "ana@example.com", "pw123456"), ("beto", "beto@example.com", "pw123456")],
    )
    .await;
    let client = reqwest::Client::new();

    let login_as = |username: &'static str| {
        let client = client.clone();
        let base = base.clone();
        async move {
            let login: serde_json::Value = client
                .post(format!("{base}/api/v1/login"))
                .json(&serde_json::json!({ "username_or_email": username, "password": "pw123456" }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            login["token"].as_str().unwrap().to_owned()
        }
    };

    let ana_token = login_as("ana").await;
    let beto_token = login_as("beto").await;

    let created: serde_json::Value = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(&ana_token)
        .json(&serde_json::json!({
            "lines": [{ "product_id": "p1", "quantity": 1 }],
            "shipping_address": "Av. Siempre Viva 742",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = created["order"]["id"].as_str().unwrap().to_owned();

    let as_owner: serde_json::Value = client
        .get(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&ana_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(as_owner["id"], order_id);

    let as_stranger: serde_json::Value = client
        .get(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&beto_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(as_stranger.is_null());
}
