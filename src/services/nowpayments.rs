//! NOWPayments gateway client.
//!
//! Covers the two touch points with the processor: creating a hosted invoice
//! for an order, and authenticating the IPN callbacks it later sends back.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha512;
use std::time::Duration;
use strum::EnumString;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::NowPaymentsConfig;
use crate::entities::order::PaymentStatus;

/// Header carrying the hex HMAC-SHA512 of an IPN body
pub const IPN_SIGNATURE_HEADER: &str = "x-nowpayments-sig";

const API_KEY_HEADER: &str = "x-api-key";

type HmacSha512 = Hmac<Sha512>;

/// Failure talking to the gateway.
///
/// `Display` never includes the raw response body; callers log it separately.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway responded with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// Outbound invoice creation payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRequest {
    pub price_amount: i64,
    pub price_currency: String,
    pub order_id: String,
    pub order_description: String,
    pub ipn_callback_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Invoice reference returned by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Gateway-assigned id, normalized to a string
    pub id: String,
    /// Hosted payment page the customer is redirected to
    pub invoice_url: String,
}

/// The gateway sends ids as JSON numbers in some payloads and strings in others
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    Str(String),
    Num(serde_json::Number),
}

impl StringOrNumber {
    pub fn into_string(self) -> String {
        match self {
            StringOrNumber::Str(s) => s,
            StringOrNumber::Num(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    #[serde(default)]
    id: Option<StringOrNumber>,
    #[serde(default)]
    invoice_url: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
}

/// Invoice creation seam; the checkout service only depends on this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    /// Creates a hosted invoice. No retries; every failure is final for the call.
    async fn create_invoice(
        &self,
        api_key: &str,
        request: &InvoiceRequest,
    ) -> Result<Invoice, GatewayError>;
}

/// HTTP client for the NOWPayments REST API
#[derive(Debug, Clone)]
pub struct NowPaymentsClient {
    http: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl NowPaymentsClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subscription-checkout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &NowPaymentsConfig) -> Result<Self, GatewayError> {
        Self::new(config.api_url.clone(), config.timeout())
    }

    fn invoice_endpoint(&self) -> String {
        format!("{}/invoice", self.api_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(err.without_url().to_string())
        }
    }
}

#[async_trait]
impl InvoiceGateway for NowPaymentsClient {
    #[instrument(skip(self, api_key, request), fields(order_id = %request.order_id))]
    async fn create_invoice(
        &self,
        api_key: &str,
        request: &InvoiceRequest,
    ) -> Result<Invoice, GatewayError> {
        let resp = self
            .http
            .post(self.invoice_endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "Invoice creation rejected by gateway");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InvoiceResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(body = %body, "Gateway returned an unparseable invoice body");
            GatewayError::InvalidResponse(format!(
                "malformed body at line {} column {}",
                e.line(),
                e.column()
            ))
        })?;

        if let Some(echoed) = parsed.order_id.as_deref() {
            if echoed != request.order_id {
                return Err(GatewayError::InvalidResponse(format!(
                    "invoice issued for order {} instead of {}",
                    echoed, request.order_id
                )));
            }
        }

        let id = parsed
            .id
            .map(StringOrNumber::into_string)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing invoice id".into()))?;
        let invoice_url = parsed
            .invoice_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing invoice_url".into()))?;

        debug!(invoice_id = %id, "Invoice created");
        Ok(Invoice { id, invoice_url })
    }
}

/// Payment states reported in IPN callbacks
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GatewayPaymentStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    #[strum(default)]
    Unknown(String),
}

impl GatewayPaymentStatus {
    pub fn parse(raw: &str) -> Self {
        raw.trim()
            .parse()
            .unwrap_or_else(|_| GatewayPaymentStatus::Unknown(raw.to_string()))
    }

    /// Terminal order status this gateway state settles to, if any.
    /// In-flight and unrecognized states leave the order untouched.
    pub fn resolution(&self) -> Option<PaymentStatus> {
        match self {
            Self::Finished | Self::Confirmed => Some(PaymentStatus::Confirmed),
            Self::Failed | Self::Expired | Self::Refunded => Some(PaymentStatus::Failed),
            Self::Waiting
            | Self::Confirming
            | Self::Sending
            | Self::PartiallyPaid
            | Self::Unknown(_) => None,
        }
    }
}

/// Fields of an IPN callback the reconciliation path relies on
#[derive(Debug, Clone, Deserialize)]
pub struct IpnPayload {
    pub order_id: String,
    pub payment_status: String,
    #[serde(default)]
    pub payment_id: Option<StringOrNumber>,
    #[serde(default)]
    pub invoice_id: Option<StringOrNumber>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("callback body is not a JSON document")]
    MalformedBody,
    #[error("signature mismatch")]
    Mismatch,
}

/// Rebuilds `value` with object keys in ascending order at every depth
pub fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonical_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

/// MAC over the compact serde_json rendering of `canonical`.
///
/// Assumes the gateway's sorted-key text matches serde_json's output. Plain
/// decimals agree; exponent floats do not (`1e21` here, `1e+21` in
/// JavaScript), so callbacks carrying them fail verification.
fn ipn_mac(canonical: &Value, secret: &str) -> HmacSha512 {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.to_string().as_bytes());
    mac
}

/// Hex signature the gateway would send for `payload`
pub fn sign_ipn_payload(payload: &Value, secret: &str) -> String {
    hex::encode(ipn_mac(&canonical_json(payload), secret).finalize().into_bytes())
}

/// Checks an IPN body against its `x-nowpayments-sig` value in constant time
pub fn verify_ipn_signature(
    body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;

    let payload: Value = serde_json::from_slice(body).map_err(|_| SignatureError::MalformedBody)?;

    ipn_mac(&canonical_json(&payload), secret)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
