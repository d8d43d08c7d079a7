use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;

use bratz_server::api::password_hash_create;
use bratz_server::config::Config;
use bratz_server::database::{AppState, DatabaseConnection};
use bratz_server::models::Account;
use bratz_server::privileges::{AccountType, PrivilegeSet};

struct TestServer {
    base_url: String,
    app_state: AppState,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Build the production router on top of the test database and serve it
    /// on an ephemeral port.
    async fn spawn(pool: PgPool) -> Self {
        let app_state = AppState::from_pool(pool, Config::from_env()).await;
        let app = bratz_server::build_app(app_state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}/bratz");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .unwrap();
        });

        TestServer {
            base_url,
            app_state,
            handle,
        }
    }

    async fn db(&self) -> DatabaseConnection {
        DatabaseConnection {
            connection: self.app_state.pool.acquire().await.unwrap(),
        }
    }

    /// Insert an account directly, the way the deployment seeds its owner.
    async fn seed_account(&self, email: &str, password: &str, account_type: AccountType) -> Account {
        let mut db = self.db().await;
        db.store_account(Account {
            id: 0,
            email: email.to_string(),
            password_hash: password_hash_create(password).unwrap(),
            account_type,
            privileges: PrivilegeSet::empty(),
            profile: serde_json::json!({}),
        })
        .await
        .unwrap()
    }

    async fn login(&self, client: &reqwest::Client, email: &str, password: &str) -> String {
        let res = client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[sqlx::test]
async fn owner_login_grants_full_access(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    server
        .seed_account("owner@market.com", "super-secret-pw", AccountType::Owner)
        .await;

    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&json!({"email": "owner@market.com", "password": "super-secret-pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["account"]["account_type"], "OWNER");
    assert_eq!(body["data"]["account"]["privileges"]["ALL"], true);
    let token = body["data"]["token"].as_str().unwrap();

    // the wildcard covers admin-only routes
    let res = client
        .get(format!("{}/accounts", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // no token, no access
    let res = client
        .get(format!("{}/accounts", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // garbage tokens are rejected, not ignored
    let res = client
        .get(format!("{}/accounts", server.base_url))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test]
async fn public_registration_rules(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({
            "email": "ana@example.com",
            "password": "longenough",
            "confirm_password": "longenough",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["account"]["account_type"], "BASIC");
    assert!(body["data"]["token"].is_string());

    // duplicate email
    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({
            "email": "ana@example.com",
            "password": "longenough",
            "confirm_password": "longenough",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // short password
    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({
            "email": "short@example.com",
            "password": "short",
            "confirm_password": "short",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // confirmation mismatch
    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({
            "email": "mismatch@example.com",
            "password": "longenough",
            "confirm_password": "different1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // privileged types cannot self-register
    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({
            "email": "sneaky@example.com",
            "password": "longenough",
            "confirm_password": "longenough",
            "account_type": "OWNER",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // wrong password on login
    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&json!({"email": "ana@example.com", "password": "wrong-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test]
async fn privilege_patch_requires_panel_modifier(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    server
        .seed_account("owner@market.com", "owner-password", AccountType::Owner)
        .await;
    server
        .seed_account("manager@market.com", "manager-password", AccountType::FullManagement)
        .await;
    let custom = server
        .seed_account("custom@market.com", "custom-password", AccountType::Custom)
        .await;

    // FULL_MANAGEMENT holds ADMIN but not PANEL_MODIFIER
    let manager_token = server
        .login(&client, "manager@market.com", "manager-password")
        .await;
    let res = client
        .patch(format!(
            "{}/accounts/{}/privileges",
            server.base_url, custom.id
        ))
        .bearer_auth(&manager_token)
        .json(&json!({"privileges": {"CLIENT_CREATOR": true}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // the ALL wildcard does grant it
    let owner_token = server
        .login(&client, "owner@market.com", "owner-password")
        .await;
    let res = client
        .patch(format!(
            "{}/accounts/{}/privileges",
            server.base_url, custom.id
        ))
        .bearer_auth(&owner_token)
        .json(&json!({"privileges": {"CLIENT_CREATOR": true}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["privileges"]["CLIENT_CREATOR"], true);

    // unknown privilege keys are rejected
    let res = client
        .patch(format!(
            "{}/accounts/{}/privileges",
            server.base_url, custom.id
        ))
        .bearer_auth(&owner_token)
        .json(&json!({"privileges": {"SUPERPOWERS": true}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // so are non-boolean privilege values, with the error envelope
    let res = client
        .patch(format!(
            "{}/accounts/{}/privileges",
            server.base_url, custom.id
        ))
        .bearer_auth(&owner_token)
        .json(&json!({"privileges": {"CLIENT_CREATOR": "yes"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[sqlx::test]
async fn framework_errors_use_the_envelope(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    // missing required field
    let res = client
        .post(format!("{}/auth/register", server.base_url))
        .json(&json!({"email": "ana@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());

    // body that is not JSON at all
    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");

    // unmatched route
    let res = client
        .get(format!("{}/no-such-route", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[sqlx::test]
async fn client_discount_lifecycle(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    server
        .seed_account("owner@market.com", "owner-password", AccountType::Owner)
        .await;
    let token = server
        .login(&client, "owner@market.com", "owner-password")
        .await;

    let res = client
        .post(format!("{}/clients", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"cpf": "123.456.789-01", "name": "Ana Souza"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    // cpf is stored without formatting
    assert_eq!(body["data"]["cpf"], "12345678901");
    let client_id = body["data"]["id"].as_i64().unwrap();

    // a fresh client has no discounts
    let res = client
        .get(format!("{}/clients/{}/discounts", server.base_url, client_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"], json!({}));

    // add one, the key is lower-cased
    let res = client
        .post(format!("{}/clients/{}/discounts", server.base_url, client_id))
        .bearer_auth(&token)
        .json(&json!({"category": "Bebidas", "percentage": 5.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"], json!({"bebidas": 5.0}));

    // removing an unknown category is an error
    let res = client
        .delete(format!(
            "{}/clients/{}/discounts/doces",
            server.base_url, client_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .delete(format!(
            "{}/clients/{}/discounts/bebidas",
            server.base_url, client_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[sqlx::test]
async fn explicit_null_clears_optional_fields(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    server
        .seed_account("owner@market.com", "owner-password", AccountType::Owner)
        .await;
    let token = server
        .login(&client, "owner@market.com", "owner-password")
        .await;

    let res = client
        .post(format!("{}/clients", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"cpf": "12345678901", "name": "Ana Souza", "nickname": "Aninha"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let client_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["nickname"], "Aninha");

    // an absent field is left alone, an explicit null clears it
    let res = client
        .put(format!("{}/clients/{}", server.base_url, client_id))
        .bearer_auth(&token)
        .json(&json!({"phone": "555-0101"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["nickname"], "Aninha");
    assert_eq!(body["data"]["phone"], "555-0101");

    let res = client
        .put(format!("{}/clients/{}", server.base_url, client_id))
        .bearer_auth(&token)
        .json(&json!({"nickname": null}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["data"]["nickname"].is_null());
    assert_eq!(body["data"]["phone"], "555-0101");

    // a payload with only ignorable content is still rejected
    let res = client
        .put(format!("{}/clients/{}", server.base_url, client_id))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test]
async fn sale_registration_over_http(pool: PgPool) {
    let server = TestServer::spawn(pool).await;
    let client = reqwest::Client::new();

    server
        .seed_account("owner@market.com", "owner-password", AccountType::Owner)
        .await;
    let token = server
        .login(&client, "owner@market.com", "owner-password")
        .await;

    let res = client
        .post(format!("{}/products", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"item": "Arroz", "sale_value": 20.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let product_id = body["data"]["id"].as_i64().unwrap();

    let res = client
        .post(format!("{}/stocks", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"name": "Geral"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let stock_id = body["data"]["id"].as_i64().unwrap();

    let res = client
        .post(format!(
            "{}/stocks/{}/products/{}",
            server.base_url, stock_id, product_id
        ))
        .bearer_auth(&token)
        .json(&json!({"quantity": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let sale = json!({
        "id": "receipt-1",
        "cashier_id": "1",
        "operator": "Maria",
        "total_value": 40.0,
        "payment_method": "cash",
        "items": [{
            "product_id": product_id,
            "product_name": "Arroz",
            "quantity": 2,
            "unit_value": 20.0,
            "total_value": 40.0,
        }],
    });
    let res = client
        .post(format!("{}/finances/register-sell", server.base_url))
        .bearer_auth(&token)
        .json(&sale)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["sell_id"], "receipt-1");

    // the product listing reflects the debit
    let res = client
        .get(format!("{}/products/{}", server.base_url, product_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["quantity_in_stock"], 8);

    // overselling fails and leaves the stock untouched
    let oversell = json!({
        "id": "receipt-2",
        "cashier_id": "1",
        "operator": "Maria",
        "total_value": 400.0,
        "payment_method": "cash",
        "items": [{
            "product_id": product_id,
            "product_name": "Arroz",
            "quantity": 20,
            "unit_value": 20.0,
            "total_value": 400.0,
        }],
    });
    let res = client
        .post(format!("{}/finances/register-sell", server.base_url))
        .bearer_auth(&token)
        .json(&oversell)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(format!("{}/products/{}", server.base_url, product_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["quantity_in_stock"], 8);
}
