//! The router end to end, one request at a time.

#![allow(clippy::unwrap_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use siqgarbs_core::{Money, Permission, PermissionSet};
use siqgarbs_integration_tests::TestContext;
use siqgarbs_storefront::services::CartService;
use tower::ServiceExt;

const CLIENT_IP: &str = "203.0.113.7";

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned()
}

#[tokio::test]
async fn test_health_endpoints_and_common_headers() {
    let ctx = TestContext::new();
    let app = ctx.router();

    let response = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");

    let ready = send(&app, request("GET", "/health/ready", None, None)).await;
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_request_id_is_echoed() {
    let ctx = TestContext::new();
    let mut req = request("GET", "/health", None, None);
    req.headers_mut()
        .insert("x-request-id", "edge-1234".parse().unwrap());

    let response = send(&ctx.router(), req).await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "edge-1234");
}

#[tokio::test]
async fn test_cart_requires_session() {
    let ctx = TestContext::new();
    let app = ctx.router();

    let response = send(&app, request("GET", "/cart", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "UNAUTHENTICATED");

    let forged = send(&app, request("GET", "/cart", Some("token=not.a.jwt"), None)).await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_sets_session_cookie_that_me_accepts() {
    let ctx = TestContext::new();
    let app = ctx.router();

    let response = send(
        &app,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "New@Shop.test", "name": "New", "password": "long-enough"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    let user = json_body(response).await;
    assert_eq!(user["email"], "new@shop.test");
    assert_eq!(user["permissions"], json!(["USER"]));
    assert!(user.get("password_hash").is_none());

    let session = cookie.split(';').next().unwrap().to_owned();
    let me = send(&app, request("GET", "/auth/me", Some(&session), None)).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(json_body(me).await["user"]["email"], "new@shop.test");

    let anonymous = send(&app, request("GET", "/auth/me", None, None)).await;
    assert_eq!(json_body(anonymous).await["user"], Value::Null);
}

#[tokio::test]
async fn test_duplicate_signup_conflicts() {
    let ctx = TestContext::new();
    let app = ctx.router();
    ctx.user("taken@shop.test").await;

    let response = send(
        &app,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "TAKEN@shop.test", "name": "Again", "password": "long-enough"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["kind"], "CONFLICT");
}

#[tokio::test]
async fn test_signout_expires_cookie() {
    let ctx = TestContext::new();

    let response = send(&ctx.router(), request("POST", "/auth/signout", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_request_reset_answers_alike_for_unknown_email() {
    let ctx = TestContext::new();
    let app = ctx.router();
    ctx.user("known@shop.test").await;

    let known = send(
        &app,
        request("POST", "/auth/request-reset", None, Some(json!({"email": "known@shop.test"}))),
    )
    .await;
    let unknown = send(
        &app,
        request("POST", "/auth/request-reset", None, Some(json!({"email": "ghost@shop.test"}))),
    )
    .await;

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(json_body(known).await, json_body(unknown).await);
    assert_eq!(ctx.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_sign_in_is_rate_limited_per_client() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let attempt = || {
        request(
            "POST",
            "/auth/signin",
            None,
            Some(json!({"email": "nobody@shop.test", "password": "wrong-password"})),
        )
    };

    for _ in 0..5 {
        let response = send(&app, attempt()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let limited = send(&app, attempt()).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(limited).await["error"]["kind"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_checkout_ignores_client_supplied_amount() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let seller = ctx.user("seller@shop.test").await;
    let buyer = ctx.user("buyer@shop.test").await;
    let shirt = ctx.item(&seller, "Shirt", 500).await;
    let mug = ctx.item(&seller, "Mug", 300).await;
    let cookie = ctx.session_cookie(&buyer);

    for item in [shirt.id, shirt.id, mug.id] {
        let added = send(
            &app,
            request("POST", "/cart/items", Some(&cookie), Some(json!({"item_id": item}))),
        )
        .await;
        assert_eq!(added.status(), StatusCode::OK);
    }

    let cart = json_body(send(&app, request("GET", "/cart", Some(&cookie), None)).await).await;
    assert_eq!(cart["item_count"], 3);
    assert_eq!(cart["subtotal"], 1300);

    let response = send(
        &app,
        request(
            "POST",
            "/checkout",
            Some(&cookie),
            Some(json!({"token": "tok_visa", "amount": 1})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = json_body(response).await;
    assert_eq!(order["total"], 1300);
    assert_eq!(order["currency"], "USD");

    assert_eq!(ctx.payments.charges()[0].amount, Money::from_minor(1300));
    assert!(CartService::new(&ctx.stores).cart(&buyer).await.unwrap().is_empty());

    let orders = json_body(send(&app, request("GET", "/orders", Some(&cookie), None)).await).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkout_without_session_is_unauthenticated() {
    let ctx = TestContext::new();

    let response = send(
        &ctx.router(),
        request("POST", "/checkout", None, Some(json!({"token": "tok_visa"}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(ctx.payments.charges().is_empty());
}

#[tokio::test]
async fn test_empty_cart_checkout_is_bad_request() {
    let ctx = TestContext::new();
    let buyer = ctx.user("buyer@shop.test").await;
    let cookie = ctx.session_cookie(&buyer);

    let response = send(
        &ctx.router(),
        request("POST", "/checkout", Some(&cookie), Some(json!({"token": "tok_visa"}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["kind"], "EMPTY_CART");
}

#[tokio::test]
async fn test_removing_foreign_cart_entry_is_forbidden() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let seller = ctx.user("seller@shop.test").await;
    let owner = ctx.user("owner@shop.test").await;
    let intruder = ctx.user("intruder@shop.test").await;
    let hat = ctx.item(&seller, "Hat", 700).await;
    let entry = CartService::new(&ctx.stores)
        .add_to_cart(&owner, hat.id)
        .await
        .unwrap();

    let response = send(
        &app,
        request(
            "DELETE",
            &format!("/cart/items/{}", entry.id),
            Some(&ctx.session_cookie(&intruder)),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["kind"], "FORBIDDEN");
    assert_eq!(ctx.store.cart_entry_count().await, 1);
}

#[tokio::test]
async fn test_malformed_input_gets_json_validation_error() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let buyer = ctx.user("buyer@shop.test").await;
    let cookie = ctx.session_cookie(&buyer);

    let bad_body = send(
        &app,
        request("POST", "/cart/items", Some(&cookie), Some(json!({"item": "seven"}))),
    )
    .await;
    assert_eq!(bad_body.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_body).await["error"]["kind"], "VALIDATION_ERROR");

    let bad_path = send(&app, request("GET", "/items/seven", None, None)).await;
    assert_eq!(bad_path.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_path).await["error"]["kind"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_catalog_listing_is_public_and_paginated() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let seller = ctx.user("seller@shop.test").await;
    for n in 1..=3 {
        ctx.item(&seller, &format!("Item {n}"), 100 * n).await;
    }

    let page = json_body(send(&app, request("GET", "/items?page=1&per_page=2", None, None)).await)
        .await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["title"], "Item 3");

    let rejected = send(&app, request("GET", "/items?per_page=0", None, None)).await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_permission_update_over_http() {
    let ctx = TestContext::new();
    let app = ctx.router();
    let admin = ctx
        .user_with("admin@shop.test", PermissionSet::from_iter([Permission::Admin]))
        .await;
    let user = ctx.user("user@shop.test").await;
    let uri = format!("/users/{}/permissions", user.id);
    let body = json!({"permissions": ["USER", "ITEMCREATE"]});

    let denied = send(
        &app,
        request("PUT", &uri, Some(&ctx.session_cookie(&user)), Some(body.clone())),
    )
    .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let granted = send(
        &app,
        request("PUT", &uri, Some(&ctx.session_cookie(&admin)), Some(body)),
    )
    .await;
    assert_eq!(granted.status(), StatusCode::OK);
    assert_eq!(
        json_body(granted).await["permissions"],
        json!(["USER", "ITEMCREATE"])
    );
}
