#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{json, Value};
use subscription_checkout::{
    app,
    config::AppConfig,
    db,
    entities::{order, product},
    services::{nowpayments::sign_ipn_payload, NowPaymentsClient},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Respond, ResponseTemplate,
};

pub const API_KEY: &str = "test-api-key";
pub const IPN_SECRET: &str = "test-ipn-secret";
pub const BASE_URL: &str = "https://shop.example.com";

/// Gateway stand-in that issues an invoice for whatever order it is asked about.
pub struct IssueInvoice;

impl Respond for IssueInvoice {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let order_id = body["order_id"].as_str().unwrap_or_default().to_string();
        ResponseTemplate::new(200).set_body_json(json!({
            "id": 5077125051u64,
            "token_id": "iK3jHdEFg",
            "order_id": order_id,
            "order_description": body["order_description"],
            "price_amount": body["price_amount"].to_string(),
            "price_currency": body["price_currency"],
            "invoice_url": format!("https://nowpayments.io/payment/?iid=5077125051&order={}", order_id),
            "created_at": "2024-06-01T10:00:00.000Z"
        }))
    }
}

/// Helper harness for spinning up the application backed by an in-memory SQLite
/// database and a mock NOWPayments server.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: MockServer,
}

impl TestApp {
    /// Fully configured application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same as [`TestApp::new`] but lets the test adjust configuration first.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let gateway = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.public_base_url = Some(BASE_URL.to_string());
        cfg.nowpayments.api_key = Some(API_KEY.to_string());
        cfg.nowpayments.ipn_secret = Some(IPN_SECRET.to_string());
        cfg.nowpayments.api_url = format!("{}/v1", gateway.uri());
        cfg.nowpayments.timeout_secs = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let client = NowPaymentsClient::from_config(&cfg.nowpayments)
            .expect("failed to build gateway client");
        let state = AppState::new(Arc::new(pool), Arc::new(cfg), Arc::new(client));

        Self {
            router: app(state.clone()),
            state,
            gateway,
        }
    }

    /// Gateway answers every invoice request successfully.
    pub async fn gateway_issues_invoices(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .respond_with(IssueInvoice)
            .mount(&self.gateway)
            .await;
    }

    /// Gateway answers every invoice request with `template`.
    pub async fn gateway_responds_with(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .respond_with(template)
            .mount(&self.gateway)
            .await;
    }

    /// Bodies of every invoice request the gateway received.
    pub async fn invoice_requests(&self) -> Vec<wiremock::Request> {
        self.gateway
            .received_requests()
            .await
            .unwrap_or_default()
    }

    /// Send a JSON request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let body = body.map(|json| json.to_string());
        self.request_raw(method, uri, body, &[]).await
    }

    /// Send a request with a pre-serialized body and extra headers.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(raw) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(raw)
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn checkout(&self, payload: Value) -> Response {
        self.request(Method::POST, "/api/checkout", Some(payload))
            .await
    }

    /// Posts an IPN body signed with the configured secret.
    pub async fn post_signed_ipn(&self, payload: &Value) -> Response {
        let signature = sign_ipn_payload(payload, IPN_SECRET);
        self.post_ipn(payload.to_string(), Some(&signature)).await
    }

    pub async fn post_ipn(&self, body: String, signature: Option<&str>) -> Response {
        let headers: Vec<(&str, &str)> = signature
            .map(|sig| vec![("x-nowpayments-sig", sig)])
            .unwrap_or_default();
        self.request_raw(
            Method::POST,
            "/api/payments/nowpayments/ipn",
            Some(body),
            &headers,
        )
        .await
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count orders")
    }

    pub async fn product_count(&self) -> u64 {
        product::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count products")
    }

    pub async fn find_order(&self, id: Uuid) -> Option<order::Model> {
        order::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("load order")
    }

    /// Runs a successful checkout and returns the new order id.
    pub async fn place_order(&self, plan: &str) -> Uuid {
        let response = self.checkout(valid_checkout(plan)).await;
        assert_eq!(response.status(), 200, "checkout should succeed");
        let body = response_json(response).await;
        body["orderId"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("order id in checkout response")
    }
}

pub fn valid_checkout(plan: &str) -> Value {
    json!({
        "fullName": "Jane Doe",
        "email": "jane@example.com",
        "region": "US",
        "adultChannels": false,
        "plan": plan
    })
}

pub fn ipn_payload(order_id: &str, status: &str) -> Value {
    json!({
        "payment_id": 4522625843u64,
        "invoice_id": 5077125051u64,
        "payment_status": status,
        "pay_address": "0x5a2d2a8f2ef24c0a0a5c7b4c3e1b0d8e6f9a1b2c",
        "price_amount": 59,
        "price_currency": "usd",
        "pay_amount": 0.0187,
        "actually_paid": 0.0187,
        "pay_currency": "eth",
        "order_id": order_id,
        "order_description": "12 Months subscription",
        "outcome_amount": 0.0185,
        "outcome_currency": "eth"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
