//! End-to-end tests: the real router against an in-memory database.

use std::collections::HashMap;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tally_api::auth::{hash_password, JwtManager};
use tally_api::config::BootstrapAdmin;
use tally_api::state::AppState;
use tally_api::{build_router, cors_layer, ensure_bootstrap_admin};
use tally_core::user::NewUser;
use tally_core::{PermissionTable, Role, User};
use tally_db::{Database, DbConfig, UserUpdate};
use tower::ServiceExt;

const SECRET: &str = "test-secret-test-secret-test-secret";
const PASSWORD: &str = "password123";

struct TestApp {
    router: Router,
    db: Database,
    jwt: JwtManager,
}

/// Argon2 is slow in debug builds, so every seeded user shares one hash.
fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap())
}

async fn app_with(permissions: PermissionTable) -> TestApp {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let state = AppState::new(db.clone(), JwtManager::new(SECRET, 1), permissions);
    TestApp {
        router: build_router(state, cors_layer(&[]).unwrap()),
        db,
        jwt: JwtManager::new(SECRET, 1),
    }
}

async fn app() -> TestApp {
    app_with(PermissionTable::default()).await
}

impl TestApp {
    /// Creates a user and returns it with a valid token.
    async fn login_as(&self, email: &str, role: Role) -> (User, String) {
        let new_user = NewUser::new("Test", "User", email, role, None).unwrap();
        let user = self.db.users().create(&new_user, password_hash()).await.unwrap();
        let token = self.jwt.generate_access_token(&user).unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// A product created through the API by a manager.
    async fn product(&self, manager: &str, barcode: &str, price_cents: i64, stock: i64) -> String {
        let (status, body) = self
            .post(
                "/api/products",
                manager,
                json!({
                    "name": format!("Product {barcode}"),
                    "priceCents": price_cents,
                    "barcode": barcode,
                    "category": "spirits",
                    "stock": stock,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn vendor(&self, token: &str, name: &str) -> String {
        let email = format!("{}@vendors.example", name.to_lowercase().replace(' ', "."));
        let (status, body) = self
            .post("/api/vendors", token, json!({ "name": name, "email": email }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn purchase(&self, token: &str, vendor_id: &str, category: &str, cents: i64) -> Value {
        let (status, body) = self
            .post(
                "/api/purchases",
                token,
                json!({
                    "vendorId": vendor_id,
                    "description": "Monthly order",
                    "category": category,
                    "items": [{ "description": "Line", "quantity": 1, "unitPriceCents": cents }],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }
}

// =============================================================================
// Health and Session Guard
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = app().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "up");
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let app = app().await;

    let (status, body) = app.send(Method::GET, "/api/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = app.get("/api/cart", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_of_deactivated_user_is_refused() {
    let app = app().await;
    let (user, token) = app.login_as("gone@example.com", Role::User).await;
    let update = UserUpdate {
        is_active: Some(false),
        ..UserUpdate::default()
    };
    app.db.users().update(&user.id, &update).await.unwrap();

    let (status, body) = app.get("/api/cart", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn test_register_login_and_me() {
    let app = app().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "firstName": "Robin",
                "lastName": "Bar",
                "email": "Robin@Example.com",
                "password": "secret1",
                "role": "admin",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    // Self-registration never grants a role
    assert_eq!(body["data"]["user"]["role"], "user");
    assert_eq!(body["data"]["user"]["email"], "robin@example.com");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "robin@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["firstName"], "Robin");
    assert_eq!(body["data"]["permissions"], json!(["sales"]));
}

#[tokio::test]
async fn test_login_failures() {
    let app = app().await;
    let (user, _) = app.login_as("sam@example.com", Role::User).await;

    for (email, password) in [("sam@example.com", "wrong-password"), ("nobody@example.com", PASSWORD)] {
        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    let update = UserUpdate {
        is_active: Some(false),
        ..UserUpdate::default()
    };
    app.db.users().update(&user.id, &update).await.unwrap();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "sam@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = app().await;
    app.login_as("taken@example.com", Role::User).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "firstName": "Copy",
                "lastName": "Cat",
                "email": "taken@example.com",
                "password": "secret1",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_change_password() {
    let app = app().await;
    let (_, token) = app.login_as("pw@example.com", Role::User).await;

    let (status, _) = app
        .post(
            "/api/auth/change-password",
            &token,
            json!({ "currentPassword": "nope-nope", "newPassword": "brand-new" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/auth/change-password",
            &token,
            json!({ "currentPassword": PASSWORD, "newPassword": "brand-new" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "pw@example.com", "password": "brand-new" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_profile() {
    let app = app().await;
    let (_, token) = app.login_as("me@example.com", Role::Manager).await;
    app.login_as("taken@example.com", Role::User).await;

    let (status, body) = app
        .put(
            "/api/auth/update-profile",
            &token,
            json!({ "firstName": "Morgan", "email": "Morgan@Example.com", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["firstName"], "Morgan");
    assert_eq!(body["data"]["lastName"], "User");
    assert_eq!(body["data"]["email"], "morgan@example.com");
    assert_eq!(body["data"]["role"], "manager");

    let (_, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(body["data"]["user"]["email"], "morgan@example.com");

    let (status, body) = app
        .put("/api/auth/update-profile", &token, json!({ "email": "taken@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = app
        .put("/api/auth/update-profile", &token, json!({ "email": "not-an-email" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_user_management_needs_manage_users() {
    let app = app().await;
    let (_, manager) = app.login_as("mgr@example.com", Role::Manager).await;
    let (admin_user, admin) = app.login_as("admin@example.com", Role::Admin).await;

    let (status, body) = app.get("/api/users", &manager).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = app
        .post(
            "/api/users",
            &admin,
            json!({
                "firstName": "Alex",
                "lastName": "Count",
                "email": "alex@example.com",
                "password": "secret1",
                "role": "accountant",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["role"], "accountant");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .put(&format!("/api/users/{id}"), &admin, json!({ "isActive": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (status, _) = app
        .put(
            &format!("/api/users/{}", admin_user.id),
            &admin,
            json!({ "isActive": false }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/users?limit=2", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
}

// =============================================================================
// Products, Cart and Orders
// =============================================================================

#[tokio::test]
async fn test_product_writes_need_manager() {
    let app = app().await;
    let (_, user) = app.login_as("u@example.com", Role::User).await;
    let (_, manager) = app.login_as("m@example.com", Role::Manager).await;

    let (status, _) = app
        .post(
            "/api/products",
            &user,
            json!({ "name": "Gin", "priceCents": 100, "barcode": "1", "category": "spirits" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let id = app.product(&manager, "4000", 2899, 2).await;

    // {stock: n} adds n
    let (status, body) = app
        .put(&format!("/api/products/{id}"), &manager, json!({ "stock": 5, "note": "Delivery" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stock"], 7);

    let (status, body) = app.get(&format!("/api/products/{id}/history"), &user).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["reason"], "restock");
    assert_eq!(history[0]["note"], "Delivery");
    assert_eq!(history[1]["reason"], "initial");

    let (status, body) = app.get("/api/products/barcode/4000", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = app
        .post(
            "/api/products",
            &manager,
            json!({ "name": "Dup", "priceCents": 1, "barcode": "4000", "category": "other" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() {
    let app = app().await;
    let (_, manager) = app.login_as("m@example.com", Role::Manager).await;

    let (status, body) = app
        .post(
            "/api/products",
            &manager,
            json!({
                "name": "Gold Bar",
                "priceCents": i64::MAX,
                "barcode": "9000",
                "category": "other",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let vendor = app.vendor(&manager, "Big Spender").await;
    let (status, body) = app
        .post(
            "/api/purchases",
            &manager,
            json!({
                "vendorId": vendor,
                "description": "Too much",
                "category": "other",
                "items": [{ "description": "Line", "quantity": 2, "unitPriceCents": i64::MAX }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cart_checkout_flow() {
    let app = app().await;
    let (_, manager) = app.login_as("m@example.com", Role::Manager).await;
    let (_, user) = app.login_as("u@example.com", Role::User).await;
    let gin = app.product(&manager, "5000", 2500, 3).await;

    let (status, body) = app.get("/api/cart", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"], json!([]));

    let (status, body) = app
        .post("/api/cart/add", &user, json!({ "productId": gin, "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");

    let (status, body) = app
        .post("/api/cart/add", &user, json!({ "productId": gin, "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalCents"], 5000);

    let (status, body) = app
        .put(&format!("/api/cart/{gin}"), &user, json!({ "quantity": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalCents"], 7500);

    let (status, body) = app
        .post("/api/orders", &user, json!({ "paymentMethod": "room-charge" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["totalCents"], 7500);
    assert_eq!(body["data"]["status"], "pending");

    let (_, body) = app.get(&format!("/api/products/{gin}"), &user).await;
    assert_eq!(body["data"]["stock"], 0);

    let (status, body) = app
        .post("/api/orders", &user, json!({ "paymentMethod": "cash" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_order_visibility_and_status() {
    let app = app().await;
    let (_, manager) = app.login_as("m@example.com", Role::Manager).await;
    let (_, owner) = app.login_as("owner@example.com", Role::User).await;
    let (_, stranger) = app.login_as("other@example.com", Role::User).await;
    let (_, admin) = app.login_as("admin@example.com", Role::Admin).await;
    let tonic = app.product(&manager, "6000", 150, 10).await;

    app.post("/api/cart/add", &owner, json!({ "productId": tonic, "quantity": 2 }))
        .await;
    let (_, body) = app
        .post("/api/orders", &owner, json!({ "paymentMethod": "card" }))
        .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/orders/{order_id}");

    assert_eq!(app.get(&uri, &owner).await.0, StatusCode::OK);
    assert_eq!(app.get(&uri, &stranger).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.get(&uri, &admin).await.0, StatusCode::OK);

    let (status, _) = app.put(&uri, &owner, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.put(&uri, &admin, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    let (status, body) = app.put(&uri, &admin, json!({ "status": "cancelled" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, body) = app.get("/api/orders/admin?status=completed", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = app.get("/api/orders/sales", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orderCount"], 1);
    assert_eq!(body["data"]["revenueCents"], 300);
    assert_eq!(body["data"]["itemsSold"], 2);

    let (_, body) = app.get("/api/orders", &stranger).await;
    assert_eq!(body["data"], json!([]));
}

// =============================================================================
// Purchases, Vendors and Reports
// =============================================================================

#[tokio::test]
async fn test_purchase_approval_needs_permission() {
    let app = app().await;
    let (_, accountant) = app.login_as("acc@example.com", Role::Accountant).await;
    let (_, manager) = app.login_as("mgr@example.com", Role::Manager).await;
    let (_, admin) = app.login_as("admin@example.com", Role::Admin).await;

    let vendor = app.vendor(&manager, "Coastal Spirits").await;
    let purchase = app.purchase(&accountant, &vendor, "materials", 12_000).await;
    assert_eq!(purchase["status"], "pending");
    let uri = format!("/api/purchases/{}", purchase["id"].as_str().unwrap());

    let (status, body) = app.put(&uri, &accountant, json!({ "status": "approved" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = app.put(&uri, &manager, json!({ "status": "received" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"]["approvalDate"].is_string());
    assert!(body["data"]["actualDeliveryDate"].is_string());

    // Managers hold no delete_purchases, admins may not delete non-pending
    assert_eq!(app.delete(&uri, &manager).await.0, StatusCode::FORBIDDEN);
    let (status, body) = app.delete(&uri, &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = app.get(&format!("/api/vendors/{vendor}"), &accountant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalAmountCents"], 12_000);
    assert_eq!(body["data"]["stats"]["totalPurchases"], 1);
}

#[tokio::test]
async fn test_bulk_update_reports_each_failure() {
    let app = app().await;
    let (_, manager) = app.login_as("mgr@example.com", Role::Manager).await;
    let vendor = app.vendor(&manager, "Harbour Glass").await;
    let first = app.purchase(&manager, &vendor, "other", 100).await;
    let second = app.purchase(&manager, &vendor, "other", 200).await;

    let uri = format!("/api/purchases/{}", second["id"].as_str().unwrap());
    app.put(&uri, &manager, json!({ "status": "cancelled" })).await;

    let (status, body) = app
        .put(
            "/api/purchases/bulk",
            &manager,
            json!({
                "ids": [first["id"], second["id"], "missing"],
                "patch": { "status": "approved" },
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["matched"], 2);
    assert_eq!(body["data"]["modified"], 1);
    assert_eq!(body["data"]["failures"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reports_need_view_reports() {
    let app = app().await;
    let (_, user) = app.login_as("u@example.com", Role::User).await;
    let (_, accountant) = app.login_as("acc@example.com", Role::Accountant).await;

    let (status, _) = app.get("/api/reports/profit-loss", &user).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get("/api/reports/profit-loss?from=2026-01-01&to=2026-01-31&compare=true", &accountant)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["revenueCents"], 0);
    assert_eq!(body["data"]["grossMarginBps"], 0);
    assert!(body["data"]["comparison"].is_object());

    let (status, _) = app.get("/api/reports/cash-flow", &accountant).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get("/api/reports/expenses?from=2026-02-01&to=2026-01-01", &accountant)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_vendor_policy_follows_permission_overrides() {
    let overrides = HashMap::from([(
        "accountant".to_string(),
        vec!["view_purchases".to_string(), "manage_vendors".to_string()],
    )]);
    let app = app_with(PermissionTable::with_overrides(&overrides).unwrap()).await;
    let (_, accountant) = app.login_as("acc@example.com", Role::Accountant).await;
    let (_, user) = app.login_as("u@example.com", Role::User).await;

    let vendor = app.vendor(&accountant, "Poster Lab").await;
    assert_eq!(app.get("/api/vendors", &user).await.0, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/vendors?search=poster", &accountant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["id"], vendor.as_str());

    // The override replaced create_purchases and view_reports
    let (status, _) = app.get("/api/reports/expenses", &accountant).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Dashboard
// =============================================================================

#[tokio::test]
async fn test_dashboard_is_admin_only() {
    let app = app().await;
    let (_, manager) = app.login_as("m@example.com", Role::Manager).await;
    let (_, clerk) = app.login_as("u@example.com", Role::User).await;
    let (_, admin) = app.login_as("admin@example.com", Role::Admin).await;
    let rum = app.product(&manager, "7000", 1800, 6).await;

    app.post("/api/cart/add", &clerk, json!({ "productId": rum, "quantity": 3 }))
        .await;
    let (_, body) = app
        .post("/api/orders", &clerk, json!({ "paymentMethod": "cash" }))
        .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    app.put(&format!("/api/orders/{order_id}"), &admin, json!({ "status": "completed" }))
        .await;

    for uri in ["/api/dashboard/overview", "/api/dashboard/transactions", "/api/dashboard/sales-stats"] {
        assert_eq!(app.get(uri, &manager).await.0, StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, body) = app.get("/api/dashboard/overview", &admin).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let overview = &body["data"];
    assert_eq!(overview["revenue"]["totalCents"], 5400);
    assert_eq!(overview["revenue"]["dailyCents"], 5400);
    assert_eq!(overview["orders"], json!({ "total": 1, "pending": 0 }));
    assert_eq!(overview["products"]["lowStock"][0]["stock"], 3);
    assert_eq!(overview["products"]["topSelling"][0]["totalSold"], 3);
    assert_eq!(overview["salesByCategory"][0]["category"], "spirits");

    let (status, body) = app.get("/api/dashboard/transactions", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], order_id.as_str());
    assert_eq!(body["data"][0]["customerEmail"], "u@example.com");

    let (status, body) = app.get("/api/dashboard/sales-stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let days = body["data"].as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days[6]["orders"], 1);
    assert_eq!(days[6]["revenueCents"], 5400);
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_bootstrap_admin_only_on_empty_database() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let admin = BootstrapAdmin {
        first_name: "Ada".to_string(),
        last_name: "Admin".to_string(),
        email: "ada@example.com".to_string(),
        password: "changeme".to_string(),
    };

    let created = ensure_bootstrap_admin(&db, &admin).await.unwrap().unwrap();
    assert_eq!(created.role, Role::Admin);
    assert!(ensure_bootstrap_admin(&db, &admin).await.unwrap().is_none());
    assert_eq!(db.users().count().await.unwrap(), 1);
}
