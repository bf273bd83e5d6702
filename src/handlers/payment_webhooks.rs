use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;

use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::{nowpayments::IPN_SIGNATURE_HEADER, reconciliation::IpnOutcome},
};

// POST /api/payments/nowpayments/ipn
#[utoipa::path(
    post,
    path = "/api/payments/nowpayments/ipn",
    request_body(content = String, description = "Raw IPN JSON body as sent by the gateway", content_type = "application/json"),
    params(
        ("x-nowpayments-sig" = String, Header, description = "Hex HMAC-SHA512 of the key-sorted body")
    ),
    responses(
        (status = 200, description = "Callback applied (possibly as a no-op)", body = IpnOutcome),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 500, description = "IPN secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn nowpayments_ipn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IpnOutcome>, ServiceError> {
    let signature = headers
        .get(IPN_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.reconciliation.handle_ipn(&body, signature).await?;
    Ok(Json(outcome))
}
