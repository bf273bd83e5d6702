use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::{error, Instrument};

use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::checkout::{CheckoutRequest, CheckoutResponse},
    tracing::{current_request_id, scope_request_id},
};

/// Start a checkout and obtain the hosted invoice URL.
///
/// The checkout runs on its own task so a client that disconnects mid-request
/// does not abort it; the order can still be reconciled by the gateway callback.
#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Invoice created", body = CheckoutResponse),
        (status = 400, description = "Invalid input or unknown plan", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment service not configured or internal error", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;

    let checkout = state.checkout.clone();
    let request_id = current_request_id().unwrap_or_default();
    let task = tokio::spawn(
        scope_request_id(request_id, async move { checkout.submit_checkout(request).await })
            .in_current_span(),
    );

    let response = task.await.map_err(|join_err| {
        error!(error = %join_err, "Checkout task did not complete");
        ServiceError::InternalError(join_err.to_string())
    })??;

    Ok(Json(response))
}
