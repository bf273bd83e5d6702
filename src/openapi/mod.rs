use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Subscription Checkout API",
        version = "0.1.0",
        description = r#"
# Subscription Checkout API

Checkout and payment reconciliation for the subscription storefront.

## Flow

1. `POST /api/checkout` validates the form, records a pending order and returns the
   NOWPayments hosted invoice URL.
2. The customer pays on the gateway's page and is redirected to
   `/payment/success?order=<id>` or `/payment/cancel?order=<id>`.
3. NOWPayments posts signed IPN callbacks to `/api/payments/nowpayments/ipn`; verified
   callbacks settle the order as `confirmed` or `failed`.
4. `GET /api/orders/{order_id}` reports the current status to the result pages.

## Error Handling

Errors share one body shape:

```json
{
  "success": false,
  "error": "Payment service temporarily unavailable. Please try again later.",
  "details": "gateway responded with HTTP 502",
  "requestId": "9b0f6c1e-3b8e-4d55-a2b1-4f3f0d5c2a77",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Order creation and invoice hand-off"),
        (name = "Payments", description = "Gateway callbacks"),
        (name = "Plans", description = "Subscription catalog"),
        (name = "Orders", description = "Order status lookup"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::payment_webhooks::nowpayments_ipn,
        crate::handlers::plans::list_plans,
        crate::handlers::orders::get_order_status,
        crate::handlers::health::health_check,
        crate::handlers::health::status,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutResponse,
            crate::services::checkout::PlanInfo,
            crate::services::reconciliation::IpnOutcome,
            crate::handlers::plans::PlanResponse,
            crate::handlers::orders::OrderStatusResponse,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::StatusResponse,
            crate::entities::order::PaymentStatus,
            crate::entities::order::DeliveryStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
