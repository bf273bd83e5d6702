use crate::{
    config::AppConfig,
    entities::order::PaymentStatus,
    errors::ServiceError,
    repositories::OrderRepository,
    services::nowpayments::{verify_ipn_signature, GatewayPaymentStatus, IpnPayload},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Result of applying one IPN callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpnOutcome {
    pub success: bool,
    pub order_id: Uuid,
    /// Raw `payment_status` reported by the gateway
    pub gateway_status: String,
    /// Order payment status after the callback was applied
    pub payment_status: PaymentStatus,
    /// Whether this callback moved the order out of `pending`
    pub changed: bool,
}

/// Applies gateway payment callbacks to orders
#[derive(Clone)]
pub struct ReconciliationService {
    orders: OrderRepository,
    config: Arc<AppConfig>,
}

impl ReconciliationService {
    pub fn new(orders: OrderRepository, config: Arc<AppConfig>) -> Self {
        Self { orders, config }
    }

    /// Verifies and applies one callback.
    ///
    /// Every rejection happens before any write. Only a `pending` order can
    /// change, so replays and out-of-order callbacks are harmless.
    #[instrument(skip(self, body, signature))]
    pub async fn handle_ipn(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<IpnOutcome, ServiceError> {
        let secret = self.config.nowpayments.ipn_secret().ok_or_else(|| {
            ServiceError::ConfigurationError("NOWPayments IPN secret is not set".into())
        })?;

        verify_ipn_signature(body, signature, secret).map_err(|reason| {
            warn!(%reason, "Rejected payment callback");
            ServiceError::Unauthorized(reason.to_string())
        })?;

        let payload: IpnPayload = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid IPN payload: {}", e)))?;

        let order_id = Uuid::parse_str(payload.order_id.trim())
            .map_err(|_| ServiceError::NotFound("Order not found".into()))?;
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        if let (Some(stored), Some(reported)) = (
            order.nowpayments_id.as_deref(),
            payload.invoice_id.clone().map(|id| id.into_string()),
        ) {
            if stored != reported {
                warn!(
                    order_id = %order.id,
                    stored_invoice = stored,
                    reported_invoice = %reported,
                    "Callback invoice id differs from the stored one"
                );
            }
        }

        let gateway_status = GatewayPaymentStatus::parse(&payload.payment_status);
        let (payment_status, changed) = match gateway_status.resolution() {
            Some(target) => {
                if self.orders.transition_payment_status(order.id, target).await? {
                    (target, true)
                } else {
                    let current = self
                        .orders
                        .find_by_id(order.id)
                        .await?
                        .map(|o| o.payment_status)
                        .unwrap_or(order.payment_status);
                    (current, false)
                }
            }
            None => (order.payment_status, false),
        };

        info!(
            order_id = %order.id,
            gateway_status = %payload.payment_status,
            payment_id = ?payload.payment_id.map(|id| id.into_string()),
            payment_status = ?payment_status,
            changed,
            "Payment callback applied"
        );

        Ok(IpnOutcome {
            success: true,
            order_id: order.id,
            gateway_status: payload.payment_status,
            payment_status,
            changed,
        })
    }
}
