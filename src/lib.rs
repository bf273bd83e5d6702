//! Subscription checkout service
//!
//! Order lifecycle for the subscription storefront: checkout validation,
//! NOWPayments invoice hand-off and IPN-driven payment reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use utoipa::ToSchema;

use crate::repositories::{OrderRepository, ProductRepository};
use crate::services::{CheckoutService, InvoiceGateway, ReconciliationService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationService,
    pub orders: OrderRepository,
}

impl AppState {
    /// Wires repositories and services around one pool and one gateway client
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        gateway: Arc<dyn InvoiceGateway>,
    ) -> Self {
        let orders = OrderRepository::new(db.clone());
        let products = ProductRepository::new(db.clone());

        Self {
            checkout: CheckoutService::new(orders.clone(), products, gateway, config.clone()),
            reconciliation: ReconciliationService::new(orders.clone(), config.clone()),
            orders,
            config,
            db,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Routes mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route(
            "/payments/nowpayments/ipn",
            post(handlers::payment_webhooks::nowpayments_ipn),
        )
        .route("/plans", get(handlers::plans::list_plans))
        .route("/orders/:order_id", get(handlers::orders::get_order_status))
}

/// Full application router with request-id, tracing and panic layers
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/status", get(handlers::health::status))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .layer(CatchPanicLayer::custom(middleware_helpers::panic_response))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
