use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use mercato_api::{app, middleware::{issue_token, JwtIdentityResolver}, AppState};
use mercato_catalog::{CartItem, Item, Shop};
use mercato_core::refund::MockRefundService;
use mercato_core::{Address, Role, User};
use mercato_order::{
    EngineSettings, MemoryStore, OrderEngine, OrderItemStatus, OrderShopStatus,
    SequentialTrackingCodes,
};
use mercato_shared::Masked;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "api-test-secret";

struct TestApp {
    router: Router,
    store: MemoryStore,
    refunds: Arc<MockRefundService>,
    customer_id: Uuid,
    seller_id: Uuid,
    item: Item,
    cart_item_id: Uuid,
}

fn setup() -> TestApp {
    let store = MemoryStore::new();

    let customer_id = Uuid::new_v4();
    let address = Address {
        id: Uuid::new_v4(),
        user_id: customer_id,
        recipient: Masked::new("Linh Tran".to_string()),
        phone: Masked::new("0987654321".to_string()),
        line: Masked::new("3 Trang Tien".to_string()),
        is_default: true,
    };
    store.insert_user(User {
        id: customer_id,
        display_name: "Linh".to_string(),
        default_address_id: Some(address.id),
    });
    store.insert_address(address);

    let seller_id = Uuid::new_v4();
    store.insert_user(User {
        id: seller_id,
        display_name: "Tea House".to_string(),
        default_address_id: None,
    });
    let shop = Shop::new(seller_id, "Tea House");
    store.insert_shop(shop.clone());

    let item = Item::new(shop.id, "Oolong 200g", 120_000, 5);
    store.insert_item(item.clone());
    let line = CartItem::new(customer_id, &item, 2);
    store.insert_cart_item(line.clone());

    let refunds = Arc::new(MockRefundService::new());
    let engine = OrderEngine::new(
        Arc::new(store.clone()),
        refunds.clone(),
        Arc::new(SequentialTrackingCodes::new("MC", 8)),
        EngineSettings {
            shipping_fee_per_shop: 15_000,
            ..EngineSettings::default()
        },
    );

    let state = AppState::new(Arc::new(engine), Arc::new(JwtIdentityResolver::new(SECRET)));

    TestApp {
        router: app(state),
        store,
        refunds,
        customer_id,
        seller_id,
        item,
        cart_item_id: line.id,
    }
}

fn token(user_id: Uuid, role: Role) -> String {
    issue_token(SECRET, user_id, &[role], Duration::minutes(10)).unwrap()
}

async fn send(router: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

impl TestApp {
    fn customer_token(&self) -> String {
        token(self.customer_id, Role::Customer)
    }

    fn seller_token(&self) -> String {
        token(self.seller_id, Role::Seller)
    }

    async fn place_order(&self) -> Uuid {
        let (status, body) = send(
            &self.router,
            "/v1/orders",
            Some(&self.customer_token()),
            json!({ "cart_item_ids": [self.cart_item_id] }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["order_id"].as_str().unwrap().parse().unwrap()
    }

    fn deliver(&self, order_id: Uuid) {
        self.store.update_order(order_id, |order| {
            for shop in &mut order.shops {
                shop.status = OrderShopStatus::Delivered;
                shop.delivered_at = Some(Utc::now() - Duration::days(1));
                for item in &mut shop.items {
                    item.status = OrderItemStatus::Delivered;
                }
            }
        });
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = setup();

    let (status, body) = send(&app.router, "/v1/orders", None, json!({ "cart_item_ids": [app.cart_item_id] })).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_INVALID");
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_forged_token_is_rejected() {
    let app = setup();
    let forged = issue_token("someone-else", app.customer_id, &[Role::Customer], Duration::minutes(10)).unwrap();

    let (status, body) = send(&app.router, "/v1/orders", Some(&forged), json!({ "cart_item_ids": [app.cart_item_id] })).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_create_order() {
    let app = setup();

    let (status, body) = send(
        &app.router,
        "/v1/orders",
        Some(&app.customer_token()),
        json!({ "cart_item_ids": [app.cart_item_id] }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total_amount"], 255_000);
    assert_eq!(body["tracking_codes"], json!(["MC000001"]));
    assert_eq!(app.store.item(app.item.id).unwrap().stock, 3);
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = setup();

    let (status, body) = send(&app.router, "/v1/orders", Some(&app.customer_token()), json!({ "cart": "nope" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_out_of_stock_maps_to_conflict() {
    let app = setup();
    app.store.update_item(app.item.id, |item| item.stock = 0);

    let (status, body) = send(
        &app.router,
        "/v1/orders",
        Some(&app.customer_token()),
        json!({ "cart_item_ids": [app.cart_item_id] }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "OUT_OF_STOCK");
}

#[tokio::test]
async fn test_cancel_order_refunds_and_restocks() {
    let app = setup();
    let order_id = app.place_order().await;

    let (status, body) = send(
        &app.router,
        &format!("/v1/orders/{}/cancel", order_id),
        Some(&app.customer_token()),
        json!({ "reason": "ordered twice" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["refunded_amount"], 255_000);
    assert_eq!(app.store.item(app.item.id).unwrap().stock, 5);
    assert_eq!(app.refunds.total_refunded().await, 255_000);
}

#[tokio::test]
async fn test_cancel_unknown_order_is_not_found() {
    let app = setup();

    let (status, body) = send(
        &app.router,
        &format!("/v1/orders/{}/cancel", Uuid::new_v4()),
        Some(&app.customer_token()),
        json!({ "reason": "changed my mind" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn test_return_and_approve_flow() {
    let app = setup();
    let order_id = app.place_order().await;
    app.deliver(order_id);
    let order_item_id = app.store.order(order_id).unwrap().items().next().unwrap().id;

    let (status, body) = send(
        &app.router,
        &format!("/v1/orders/{}/returns", order_id),
        Some(&app.customer_token()),
        json!({
            "items": [{ "order_item_id": order_item_id, "quantity": 1 }],
            "reason": "leaves were crushed"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["refund_amount"], 120_000);
    let return_order_id = body["return_order_id"].as_str().unwrap().to_string();
    let return_item_id = body["items"][0]["return_order_item_id"].clone();

    // Customers cannot decide their own returns
    let (status, body) = send(
        &app.router,
        &format!("/v1/returns/{}/approve", return_order_id),
        Some(&app.customer_token()),
        json!({ "return_order_item_ids": [return_item_id] }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = send(
        &app.router,
        &format!("/v1/returns/{}/approve", return_order_id),
        Some(&app.seller_token()),
        json!({ "return_order_item_ids": [return_item_id] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(body["refunded_amount"], 120_000);
    assert_eq!(app.store.item(app.item.id).unwrap().stock, 4);
    assert_eq!(app.refunds.total_refunded().await, 120_000);
}

#[tokio::test]
async fn test_reject_flow() {
    let app = setup();
    let order_id = app.place_order().await;
    app.deliver(order_id);
    let order_item_id = app.store.order(order_id).unwrap().items().next().unwrap().id;

    let (_, body) = send(
        &app.router,
        &format!("/v1/orders/{}/returns", order_id),
        Some(&app.customer_token()),
        json!({ "items": [{ "order_item_id": order_item_id, "quantity": 2 }], "reason": "not as pictured" }),
    )
    .await;
    let return_order_id = body["return_order_id"].as_str().unwrap().to_string();
    let return_item_id = body["items"][0]["return_order_item_id"].clone();

    let (status, body) = send(
        &app.router,
        &format!("/v1/returns/{}/reject", return_order_id),
        Some(&app.seller_token()),
        json!({ "return_order_item_ids": [return_item_id] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");
    assert_eq!(body["refunded_amount"], 0);
    assert_eq!(app.store.item(app.item.id).unwrap().stock, 3);
    assert_eq!(app.refunds.total_refunded().await, 0);
}
