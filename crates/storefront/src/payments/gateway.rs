//! NOWPayments invoice API client.
//!
//! Only invoice creation is used: the shopper is redirected to the returned
//! invoice URL and the outcome arrives later through the IPN webhook.

use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use stitchline_core::{CurrencyCode, OrderId};
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::config::StorefrontConfig;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Gateway answered 2xx with an unusable body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Body of `POST /invoice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub price_amount: Decimal,
    pub price_currency: String,
    pub order_id: String,
    pub order_description: String,
    pub ipn_callback_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Gateway-assigned invoice id.
    pub id: String,
    /// Where to send the shopper to pay.
    pub invoice_url: Url,
}

#[derive(Debug, Deserialize)]
struct InvoiceBody {
    id: serde_json::Value,
    invoice_url: String,
}

/// Payment gateway client.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    invoice_endpoint: String,
    currency: CurrencyCode,
    ipn_callback_url: String,
    success_url: String,
    cancel_url: String,
}

impl GatewayClient {
    /// Create a client from storefront configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StorefrontConfig) -> Result<Self, GatewayError> {
        let payments = &config.payments;

        let mut api_key = HeaderValue::from_str(payments.api_key.expose_secret())
            .map_err(|e| GatewayError::Config(format!("Invalid API key format: {e}")))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(payments.request_timeout)
            .build()?;

        Ok(Self {
            client,
            invoice_endpoint: format!(
                "{}/invoice",
                payments.api_url.as_str().trim_end_matches('/')
            ),
            currency: payments.currency,
            ipn_callback_url: config.absolute_url("/payments/webhook"),
            success_url: config.absolute_url("/payments/success"),
            cancel_url: config.absolute_url("/payments/failed"),
        })
    }

    /// Build the invoice request for an order total.
    #[must_use]
    pub fn invoice_request(&self, order_id: OrderId, amount: Decimal) -> InvoiceRequest {
        InvoiceRequest {
            price_amount: amount,
            price_currency: self.currency.gateway_code().to_owned(),
            order_id: order_id.to_string(),
            order_description: format!("Order {order_id}"),
            ipn_callback_url: self.ipn_callback_url.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        }
    }

    /// Create an invoice.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure or timeout, a non-2xx
    /// status, or a response without a usable invoice URL.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        let response = self
            .client
            .post(&self.invoice_endpoint)
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: InvoiceBody = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let id = match body.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(GatewayError::InvalidResponse(format!(
                    "unexpected invoice id {other}"
                )));
            }
        };

        let invoice_url = Url::parse(&body.invoice_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!("invalid invoice_url {:?}", body.invoice_url))
            })?;

        info!(invoice_id = %id, "Invoice created");
        Ok(Invoice { id, invoice_url })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{CartConfig, PaymentsConfig};

    fn config(api_url: &str, timeout: Duration) -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("https://shop.example.com").unwrap(),
            cart: CartConfig::default(),
            payments: PaymentsConfig {
                api_url: Url::parse(api_url).unwrap(),
                api_key: SecretString::from("test-api-key-9fK2"),
                ipn_secret: SecretString::from("ipn-test-secret-7Qz2"),
                currency: CurrencyCode::USD,
                request_timeout: timeout,
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    fn client(server: &MockServer) -> GatewayClient {
        let api_url = format!("{}/v1", server.uri());
        GatewayClient::new(&config(&api_url, Duration::from_secs(5))).unwrap()
    }

    #[test]
    fn test_invoice_request_fields() {
        let client = GatewayClient::new(&config(
            "https://api.nowpayments.io/v1",
            Duration::from_secs(5),
        ))
        .unwrap();
        let request = client.invoice_request(OrderId::new(42), dec!(100.00));

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "price_amount": 100.0,
                "price_currency": "usd",
                "order_id": "42",
                "order_description": "Order 42",
                "ipn_callback_url": "https://shop.example.com/payments/webhook",
                "success_url": "https://shop.example.com/payments/success",
                "cancel_url": "https://shop.example.com/payments/failed",
            })
        );
    }

    #[tokio::test]
    async fn test_create_invoice_success() {
        let server = MockServer::start().await;
        let client = client(&server);
        let request = client.invoice_request(OrderId::new(7), dec!(59.97));

        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .and(header("x-api-key", "test-api-key-9fK2"))
            .and(body_json(serde_json::to_value(&request).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 4_522_625_843_u64,
                "order_id": "7",
                "invoice_url": "https://nowpayments.io/payment/?iid=4522625843",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let invoice = client.create_invoice(&request).await.unwrap();
        assert_eq!(invoice.id, "4522625843");
        assert_eq!(
            invoice.invoice_url.as_str(),
            "https://nowpayments.io/payment/?iid=4522625843"
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        let client = client(&server);

        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid api key"))
            .mount(&server)
            .await;

        let err = client
            .create_invoice(&client.invoice_request(OrderId::new(1), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_unusable_invoice_url_is_rejected() {
        let server = MockServer::start().await;
        let client = client(&server);

        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc",
                "invoice_url": "javascript:alert(1)",
            })))
            .mount(&server)
            .await;

        let err = client
            .create_invoice(&client.invoice_request(OrderId::new(1), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_http_error() {
        let server = MockServer::start().await;
        let api_url = format!("{}/v1", server.uri());
        let client = GatewayClient::new(&config(&api_url, Duration::from_millis(100))).unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/invoice"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "1", "invoice_url": "https://pay.example"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client
            .create_invoice(&client.invoice_request(OrderId::new(1), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Http(ref e) if e.is_timeout()));
    }
}
