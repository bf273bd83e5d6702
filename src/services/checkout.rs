use crate::{
    catalog::{find_plan, Plan},
    config::AppConfig,
    errors::ServiceError,
    repositories::{NewOrder, OrderRepository, ProductRepository},
    services::nowpayments::{InvoiceGateway, InvoiceRequest},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Currency every invoice is priced in
pub const INVOICE_CURRENCY: &str = "usd";

/// Path the gateway posts payment callbacks to
pub const IPN_CALLBACK_PATH: &str = "/api/payments/nowpayments/ipn";

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Field order used to pick the first reported validation failure
const FIELD_ORDER: [&str; 4] = ["full_name", "email", "region", "plan"];

/// Maps short codes and marketing names still used by old links onto
/// canonical plan ids. Unrecognized values pass through trimmed.
pub fn resolve_plan_alias(raw: &str) -> String {
    let trimmed = raw.trim();
    let canonical = match trimmed.to_ascii_lowercase().as_str() {
        "3m" | "3months" | "quarterly" => "plan_3m",
        "6m" | "6months" | "semiannual" => "plan_6m",
        "12m" | "12months" | "annual" | "yearly" => "plan_12m",
        _ => return trimmed.to_string(),
    };
    canonical.to_string()
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_full_name(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(field_error("full_name", "Full name is required"));
    }
    Ok(())
}

fn validate_email_shape(value: &str) -> Result<(), ValidationError> {
    if !EMAIL_SHAPE.is_match(value.trim()) {
        return Err(field_error("email", "Valid email is required"));
    }
    Ok(())
}

fn validate_region(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(field_error("region", "Region is required"));
    }
    Ok(())
}

fn validate_plan(value: &str) -> Result<(), ValidationError> {
    if find_plan(&resolve_plan_alias(value)).is_none() {
        return Err(field_error("plan", "Invalid plan selected"));
    }
    Ok(())
}

/// Checkout form submission
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
#[schema(example = json!({
    "fullName": "Jane Doe",
    "email": "jane@example.com",
    "region": "US",
    "adultChannels": false,
    "plan": "plan_12m"
}))]
pub struct CheckoutRequest {
    #[validate(custom = "validate_full_name")]
    pub full_name: String,
    #[validate(custom = "validate_email_shape")]
    pub email: String,
    #[validate(custom = "validate_region")]
    pub region: String,
    pub adult_channels: bool,
    /// Canonical plan id or a legacy alias such as `12m` or `annual`
    #[validate(custom = "validate_plan")]
    pub plan: String,
}

/// Plan summary echoed back to the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanInfo {
    pub label: String,
    pub price: String,
}

impl From<&Plan> for PlanInfo {
    fn from(plan: &Plan) -> Self {
        Self {
            label: plan.name.to_string(),
            price: plan.display_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: Uuid,
    /// Hosted invoice page; only returned once
    pub payment_url: String,
    pub plan_info: PlanInfo,
}

struct ValidCheckout {
    full_name: String,
    email: String,
    region: String,
    adult_channels: bool,
    plan: &'static Plan,
}

impl CheckoutRequest {
    fn into_valid(self) -> Result<ValidCheckout, ServiceError> {
        self.validate().map_err(first_field_error)?;

        let plan = find_plan(&resolve_plan_alias(&self.plan))
            .ok_or_else(|| ServiceError::ValidationError("Invalid plan selected".into()))?;

        Ok(ValidCheckout {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            region: self.region.trim().to_string(),
            adult_channels: self.adult_channels,
            plan,
        })
    }
}

fn first_field_error(errors: ValidationErrors) -> ServiceError {
    let field_errors = errors.field_errors();
    let message = FIELD_ORDER
        .iter()
        .filter_map(|field| field_errors.get(field))
        .filter_map(|errs| errs.first())
        .find_map(|err| err.message.as_ref().map(|m| m.to_string()));

    match message {
        Some(message) => ServiceError::ValidationError(message),
        None => ServiceError::from(errors),
    }
}

/// Builds the invoice payload for `order_id`, with callbacks rooted at `base_url`
pub fn build_invoice_request(plan: &Plan, order_id: Uuid, base_url: &str) -> InvoiceRequest {
    let base_url = base_url.trim_end_matches('/');
    InvoiceRequest {
        price_amount: plan.price_usd,
        price_currency: INVOICE_CURRENCY.to_string(),
        order_id: order_id.to_string(),
        order_description: plan.invoice_description(),
        ipn_callback_url: format!("{}{}", base_url, IPN_CALLBACK_PATH),
        success_url: format!("{}/payment/success?order={}", base_url, order_id),
        cancel_url: format!("{}/payment/cancel?order={}", base_url, order_id),
    }
}

/// Checkout orchestrator: validates the submission, records the order and
/// hands the customer off to the gateway's hosted invoice.
#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderRepository,
    products: ProductRepository,
    gateway: Arc<dyn InvoiceGateway>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        orders: OrderRepository,
        products: ProductRepository,
        gateway: Arc<dyn InvoiceGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            orders,
            products,
            gateway,
            config,
        }
    }

    fn payment_settings(&self) -> Result<(&str, &str), ServiceError> {
        let api_key = self.config.nowpayments.api_key().ok_or_else(|| {
            ServiceError::ConfigurationError("NOWPayments API key is not set".into())
        })?;
        let base_url = self.config.public_base_url().ok_or_else(|| {
            ServiceError::ConfigurationError("Public base URL is not set".into())
        })?;
        Ok((api_key, base_url))
    }

    /// Runs one checkout end to end.
    ///
    /// Nothing is written until input, plan and payment settings all check
    /// out. Once the order exists it is never deleted: a gateway failure
    /// leaves it `failed`/`failed` for support to inspect.
    #[instrument(skip(self, request))]
    pub async fn submit_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        let checkout = request.into_valid()?;
        let plan = checkout.plan;
        let (api_key, base_url) = self.payment_settings()?;

        let product = self.products.upsert_from_plan(plan).await?;

        let order = self
            .orders
            .create(NewOrder {
                full_name: checkout.full_name,
                email: checkout.email,
                region: checkout.region,
                adult_channels: checkout.adult_channels,
                product_id: product.id,
            })
            .await?;

        info!(order_id = %order.id, plan = plan.id, "Order created, requesting invoice");

        let invoice_request = build_invoice_request(plan, order.id, base_url);
        let invoice = match self.gateway.create_invoice(api_key, &invoice_request).await {
            Ok(invoice) => invoice,
            Err(err) => {
                error!(order_id = %order.id, error = ?err, "Invoice creation failed");
                match self.orders.mark_checkout_failed(order.id).await {
                    Ok(true) => {}
                    Ok(false) => warn!(order_id = %order.id, "Order left pending state before it could be failed"),
                    Err(mark_err) => {
                        error!(order_id = %order.id, error = %mark_err, "Failed to mark order as failed")
                    }
                }
                return Err(ServiceError::GatewayUnavailable(err));
            }
        };

        self.orders.attach_invoice(order.id, &invoice.id).await?;

        info!(
            order_id = %order.id,
            invoice_id = %invoice.id,
            "Checkout ready for payment"
        );

        Ok(CheckoutResponse {
            success: true,
            order_id: order.id,
            payment_url: invoice.invoice_url,
            plan_info: PlanInfo::from(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{self, DeliveryStatus, PaymentStatus};
    use crate::repositories::test_support::migrated_db;
    use crate::services::nowpayments::{GatewayError, Invoice, MockInvoiceGateway};
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;
    use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

    const BASE_URL: &str = "https://shop.example.com";

    fn configured() -> AppConfig {
        let mut config = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        config.nowpayments.api_key = Some("test-api-key".into());
        config.public_base_url = Some(format!("{}/", BASE_URL));
        config
    }

    fn service(
        db: Arc<DatabaseConnection>,
        gateway: MockInvoiceGateway,
        config: AppConfig,
    ) -> CheckoutService {
        CheckoutService::new(
            OrderRepository::new(db.clone()),
            ProductRepository::new(db),
            Arc::new(gateway),
            Arc::new(config),
        )
    }

    fn jane(plan: &str) -> CheckoutRequest {
        CheckoutRequest {
            full_name: "  Jane Doe ".into(),
            email: "jane@example.com".into(),
            region: "US".into(),
            adult_channels: true,
            plan: plan.into(),
        }
    }

    async fn order_count(db: &DatabaseConnection) -> u64 {
        order::Entity::find().count(db).await.unwrap()
    }

    #[tokio::test]
    async fn successful_checkout_attaches_invoice() {
        let db = migrated_db().await;
        let mut gateway = MockInvoiceGateway::new();
        gateway
            .expect_create_invoice()
            .withf(|api_key, request| {
                api_key.to_string() == "test-api-key"
                    && request.price_amount == 59
                    && request.price_currency == "usd"
                    && request.order_description == "12 Months subscription"
                    && request.ipn_callback_url
                        == "https://shop.example.com/api/payments/nowpayments/ipn"
                    && request.success_url
                        == format!("{}/payment/success?order={}", BASE_URL, request.order_id)
            })
            .times(1)
            .returning(|_, _| {
                Ok(Invoice {
                    id: "5077125051".into(),
                    invoice_url: "https://nowpayments.io/payment/?iid=5077125051".into(),
                })
            });

        let response = service(db.clone(), gateway, configured())
            .submit_checkout(jane("plan_12m"))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(
            response.payment_url,
            "https://nowpayments.io/payment/?iid=5077125051"
        );
        assert_eq!(
            response.plan_info,
            PlanInfo {
                label: "12 Months".into(),
                price: "$59".into()
            }
        );

        let stored = order::Entity::find_by_id(response.order_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.full_name, "Jane Doe");
        assert!(stored.adult_channels);
        assert_eq!(stored.nowpayments_id.as_deref(), Some("5077125051"));
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(order_count(&db).await, 1);
    }

    #[rstest]
    #[case(CheckoutRequest { full_name: "   ".into(), ..jane("plan_3m") }, "Full name is required")]
    #[case(CheckoutRequest { email: "jane.example.com".into(), ..jane("plan_3m") }, "Valid email is required")]
    #[case(CheckoutRequest { email: "jane@localhost".into(), ..jane("plan_3m") }, "Valid email is required")]
    #[case(CheckoutRequest { region: "".into(), ..jane("plan_3m") }, "Region is required")]
    #[case(jane("nonexistent"), "Invalid plan selected")]
    #[case(CheckoutRequest::default(), "Full name is required")]
    #[case(CheckoutRequest { full_name: "Jane".into(), ..CheckoutRequest::default() }, "Valid email is required")]
    #[tokio::test]
    async fn invalid_input_has_no_side_effects(
        #[case] request: CheckoutRequest,
        #[case] expected: &str,
    ) {
        let db = migrated_db().await;
        let mut gateway = MockInvoiceGateway::new();
        gateway.expect_create_invoice().never();

        let err = service(db.clone(), gateway, configured())
            .submit_checkout(request)
            .await
            .unwrap_err();

        assert_matches!(err, ServiceError::ValidationError(ref msg) if msg == expected);
        assert_eq!(order_count(&db).await, 0);
    }

    #[rstest]
    #[case(None, Some(BASE_URL))]
    #[case(Some("   "), Some(BASE_URL))]
    #[case(Some("test-api-key"), None)]
    #[tokio::test]
    async fn missing_payment_settings_create_no_order(
        #[case] api_key: Option<&str>,
        #[case] base_url: Option<&str>,
    ) {
        let db = migrated_db().await;
        let mut gateway = MockInvoiceGateway::new();
        gateway.expect_create_invoice().never();

        let mut config = configured();
        config.nowpayments.api_key = api_key.map(str::to_string);
        config.public_base_url = base_url.map(str::to_string);

        let err = service(db.clone(), gateway, config)
            .submit_checkout(jane("plan_12m"))
            .await
            .unwrap_err();

        assert_matches!(err, ServiceError::ConfigurationError(_));
        assert_eq!(err.response_message(), "Payment service is not configured");
        assert_eq!(order_count(&db).await, 0);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_order_as_failed() {
        let db = migrated_db().await;
        let mut gateway = MockInvoiceGateway::new();
        gateway
            .expect_create_invoice()
            .times(1)
            .returning(|_, _| {
                Err(GatewayError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                })
            });

        let err = service(db.clone(), gateway, configured())
            .submit_checkout(jane("6m"))
            .await
            .unwrap_err();

        assert_matches!(err, ServiceError::GatewayUnavailable(_));

        let orders = order::Entity::find().all(db.as_ref()).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].product_id, "plan_6m");
        assert_eq!(orders[0].payment_status, PaymentStatus::Failed);
        assert_eq!(orders[0].delivery_status, DeliveryStatus::Failed);
        assert!(orders[0].nowpayments_id.is_none());
    }

    #[rstest]
    #[case("3m", "plan_3m")]
    #[case("3Months", "plan_3m")]
    #[case(" quarterly ", "plan_3m")]
    #[case("6m", "plan_6m")]
    #[case("SemiAnnual", "plan_6m")]
    #[case("12months", "plan_12m")]
    #[case("annual", "plan_12m")]
    #[case("YEARLY", "plan_12m")]
    #[case("plan_12m", "plan_12m")]
    #[case(" plan_6m ", "plan_6m")]
    #[case("lifetime", "lifetime")]
    fn legacy_aliases_resolve(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(resolve_plan_alias(raw), expected);
    }

    #[test]
    fn invoice_request_uses_order_scoped_urls() {
        let plan = find_plan("plan_3m").unwrap();
        let order_id = Uuid::new_v4();
        let request = build_invoice_request(plan, order_id, "https://shop.example.com/");

        assert_eq!(request.price_amount, 29);
        assert_eq!(request.order_id, order_id.to_string());
        assert_eq!(
            request.cancel_url,
            format!("https://shop.example.com/payment/cancel?order={}", order_id)
        );
        assert_eq!(
            request.ipn_callback_url,
            "https://shop.example.com/api/payments/nowpayments/ipn"
        );
    }

    proptest! {
        #[test]
        fn canonical_ids_survive_alias_resolution(idx in 0usize..3, pad in "[ \t]{0,3}") {
            let id = crate::catalog::plans()[idx].id;
            let padded = format!("{}{}{}", pad, id, pad);
            prop_assert_eq!(resolve_plan_alias(&padded), id);
        }

        #[test]
        fn emails_without_at_sign_are_rejected(local in "[a-z0-9.]{1,12}", domain in "[a-z]{1,8}\\.[a-z]{2,4}") {
            let candidate = format!("{}{}", local, domain);
            prop_assert!(validate_email_shape(&candidate).is_err());
            let with_at = format!("{}@{}", local, domain);
            prop_assert!(validate_email_shape(&with_at).is_ok());
        }
    }
}
