//! Card payments through hosted Stripe Checkout.
//!
//! The storefront creates a Checkout Session and redirects the customer to
//! its URL. Stripe then calls the webhook with `checkout.session.completed`;
//! the signature on that call is verified before anything is recorded.

use std::fmt;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

use denim_core::{Cents, ProductId, UserId};

use crate::config::PaymentConfig;

const API_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("webhook secret not configured")]
    NotConfigured,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub unit_amount: Cents,
    pub quantity: i32,
}

/// What a session pays for, carried in session metadata so the webhook
/// records the same lines the customer saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseSource {
    /// The customer's cart at session creation. Cleared once paid.
    Cart,
    /// A single product bought directly. The cart is left alone.
    Product {
        product_id: ProductId,
        quantity: i32,
        unit_amount: Cents,
    },
}

impl PurchaseSource {
    fn metadata(&self) -> Vec<(String, String)> {
        match self {
            Self::Cart => vec![("metadata[purchase]".to_owned(), "cart".to_owned())],
            Self::Product {
                product_id,
                quantity,
                unit_amount,
            } => vec![
                ("metadata[purchase]".to_owned(), "product".to_owned()),
                ("metadata[product_id]".to_owned(), product_id.to_string()),
                ("metadata[quantity]".to_owned(), quantity.to_string()),
                ("metadata[unit_amount]".to_owned(), unit_amount.get().to_string()),
            ],
        }
    }
}

/// Customer-facing URLs and metadata for a new session.
#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub items: &'a [LineItem],
    pub customer_email: Option<&'a str>,
    pub user_id: UserId,
    pub source: PurchaseSource,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

/// Stripe returns metadata values as strings.
#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    pub user_id: Option<String>,
    pub purchase: Option<String>,
    pub product_id: Option<String>,
    pub quantity: Option<String>,
    pub unit_amount: Option<String>,
}

impl SessionMetadata {
    /// Sessions without a `purchase` key were created from the cart.
    /// `None` when the key is present but the product fields do not parse.
    #[must_use]
    pub fn source(&self) -> Option<PurchaseSource> {
        match self.purchase.as_deref() {
            None | Some("cart") => Some(PurchaseSource::Cart),
            Some("product") => Some(PurchaseSource::Product {
                product_id: self.product_id.as_deref()?.parse().ok()?,
                quantity: self.quantity.as_deref()?.parse::<i32>().ok()?.max(1),
                unit_amount: Cents::new(self.unit_amount.as_deref()?.parse().ok()?),
            }),
            Some(_) => None,
        }
    }
}

/// The parts of a completed session needed to record the order.
#[derive(Debug, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl WebhookEvent {
    /// The session, if this is a `checkout.session.completed` event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Payload` if the object does not look like a
    /// checkout session.
    pub fn completed_session(self) -> Result<Option<CompletedSession>, PaymentError> {
        if self.kind != "checkout.session.completed" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.data.object)?))
    }
}

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    webhook_secret: Option<SecretString>,
    currency: String,
}

impl fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("currency", &self.currency)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Build a client when a secret key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn from_config(config: &PaymentConfig) -> Result<Option<Self>, PaymentError> {
        let Some(secret_key) = config.stripe_secret_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder().build()?;
        Ok(Some(Self {
            client,
            secret_key,
            webhook_secret: config.stripe_webhook_secret.clone(),
            currency: config.currency.clone(),
        }))
    }

    /// Create a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_checkout_session(
        &self,
        request: &SessionRequest<'_>,
    ) -> Result<CheckoutSession, PaymentError> {
        let params = session_params(request, &self.currency);
        let response = self
            .client
            .post(API_URL)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response.json().await?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Verify the `Stripe-Signature` header and decode the event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` without a webhook secret,
    /// `InvalidSignature` or `Payload` when verification or decoding fails.
    pub fn construct_event(&self, payload: &str, header: &str) -> Result<WebhookEvent, PaymentError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or(PaymentError::NotConfigured)?;
        verify_signature(
            payload,
            header,
            secret.expose_secret(),
            chrono::Utc::now().timestamp(),
        )?;
        Ok(serde_json::from_str(payload)?)
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn session_params(request: &SessionRequest<'_>, currency: &str) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        ("metadata[user_id]".to_owned(), request.user_id.to_string()),
    ];
    params.extend(request.source.metadata());
    if let Some(email) = request.customer_email {
        params.push(("customer_email".to_owned(), email.to_owned()));
    }
    for (i, item) in request.items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        params.push((format!("{prefix}[price_data][currency]"), currency.to_owned()));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.get().to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
    }
    params
}

/// Check a `t=<unix>,v1=<hex>[,v1=<hex>]` header against
/// `HMAC-SHA256(secret, "{t}.{payload}")`.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance, or no signature matches.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::InvalidSignature("Missing timestamp".to_owned()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("Missing v1 signature".to_owned()));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "Timestamp outside tolerance".to_owned(),
        ));
    }

    let signed = format!("{timestamp}.{payload}");
    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
        mac.update(signed.as_bytes());
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::InvalidSignature("Signature mismatch".to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_780_000_000;

    fn sign(payload: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, NOW - 10);
        assert!(verify_signature(payload, &header, SECRET, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign(r#"{"amount_total":100}"#, NOW);
        let result = verify_signature(r#"{"amount_total":1}"#, &header, SECRET, NOW);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_stale_signature_rejected() {
        let payload = "{}";
        let header = sign(payload, NOW - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(verify_signature(payload, &header, SECRET, NOW).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature("{}", "v1=abcd", SECRET, NOW).is_err());
        assert!(verify_signature("{}", &format!("t={NOW}"), SECRET, NOW).is_err());
    }

    #[test]
    fn test_completed_session_extracted() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "type": "checkout.session.completed",
                "data": {"object": {
                    "id": "cs_test_123",
                    "amount_total": 90000,
                    "metadata": {"user_id": "5f1d7c2a-3b4e-4f60-8a71-92c3d4e5f607"}
                }}
            }"#,
        )
        .unwrap();
        let session = event.completed_session().unwrap().unwrap();
        assert_eq!(session.id, "cs_test_123");
        assert_eq!(session.amount_total, Some(90_000));
        assert_eq!(
            session.metadata.user_id.as_deref(),
            Some("5f1d7c2a-3b4e-4f60-8a71-92c3d4e5f607")
        );
    }

    #[test]
    fn test_other_events_ignored() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"type":"charge.refunded","data":{"object":{}}}"#).unwrap();
        assert!(event.completed_session().unwrap().is_none());
    }

    #[test]
    fn test_session_params_encode_line_items() {
        let items = [LineItem {
            name: "Slim Fit Indigo".to_owned(),
            unit_amount: Cents::new(45_000),
            quantity: 2,
        }];
        let user_id = UserId::generate();
        let request = SessionRequest {
            items: &items,
            customer_email: Some("selma@shop.na"),
            user_id,
            source: PurchaseSource::Cart,
            success_url: "https://denim.na/checkout/success?session_id={CHECKOUT_SESSION_ID}".to_owned(),
            cancel_url: "https://denim.na/checkout/cancel".to_owned(),
        };
        let params = session_params(&request, "nad");
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("nad"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("45000"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("metadata[user_id]"), Some(user_id.to_string().as_str()));
        assert_eq!(get("customer_email"), Some("selma@shop.na"));
        assert_eq!(get("metadata[purchase]"), Some("cart"));
        assert_eq!(get("metadata[product_id]"), None);
    }

    fn metadata_from_params(params: &[(String, String)]) -> SessionMetadata {
        let map: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .filter_map(|(k, v)| {
                let key = k.strip_prefix("metadata[")?.strip_suffix(']')?;
                Some((key.to_owned(), serde_json::Value::String(v.clone())))
            })
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn test_product_session_metadata_names_the_product() {
        let product_id = ProductId::generate();
        let source = PurchaseSource::Product {
            product_id,
            quantity: 2,
            unit_amount: Cents::new(45_000),
        };
        let items = [LineItem {
            name: "Slim Fit Indigo".to_owned(),
            unit_amount: Cents::new(45_000),
            quantity: 2,
        }];
        let request = SessionRequest {
            items: &items,
            customer_email: None,
            user_id: UserId::generate(),
            source,
            success_url: String::new(),
            cancel_url: String::new(),
        };
        let metadata = metadata_from_params(&session_params(&request, "nad"));
        assert_eq!(metadata.source(), Some(source));
    }

    #[test]
    fn test_session_source_from_metadata() {
        let legacy = SessionMetadata::default();
        assert_eq!(legacy.source(), Some(PurchaseSource::Cart));

        let broken = SessionMetadata {
            purchase: Some("product".to_owned()),
            product_id: Some("not-a-uuid".to_owned()),
            quantity: Some("1".to_owned()),
            unit_amount: Some("100".to_owned()),
            ..SessionMetadata::default()
        };
        assert_eq!(broken.source(), None);

        let unknown = SessionMetadata {
            purchase: Some("gift".to_owned()),
            ..SessionMetadata::default()
        };
        assert_eq!(unknown.source(), None);
    }
}
