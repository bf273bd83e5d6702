use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{DeliveryStatus, Model as OrderModel, PaymentStatus};
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Order status as shown on the payment result pages. Carries no customer data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub plan_id: String,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderStatusResponse {
    fn from(order: OrderModel) -> Self {
        Self {
            order_id: order.id,
            plan_id: order.product_id,
            payment_status: order.payment_status,
            delivery_status: order.delivery_status,
            created_at: order.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    params(("order_id" = String, Path, description = "Order id returned by checkout")),
    responses(
        (status = 200, description = "Order status", body = crate::ApiResponse<OrderStatusResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderStatusResponse>>, ServiceError> {
    let not_found = || ServiceError::NotFound("Order not found".to_string());

    let order_id = Uuid::parse_str(order_id.trim()).map_err(|_| not_found())?;
    let order = state
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(ApiResponse::success(order.into())))
}
