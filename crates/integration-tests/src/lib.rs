//! Integration test harness for Stitchline.
//!
//! [`TestApp`] drives the real storefront router in-process with
//! `tower::ServiceExt::oneshot`. Catalog and order storage are the in-memory
//! collaborators, sessions use a [`SwitchableSessionStore`], and the payment
//! gateway is a `wiremock` server.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stitchline-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, header},
    response::Response,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use stitchline_core::{CurrencyCode, ProductId};
use stitchline_storefront::{
    config::{CartConfig, PaymentsConfig, StorefrontConfig},
    db::{MemoryCatalog, MemoryOrderStore},
    middleware::{create_session_layer, session::SESSION_COOKIE_NAME},
    models::Product,
    payments::{SIGNATURE_HEADER, WebhookPayload, WebhookVerifier},
    routes,
    state::AppState,
};
use tower::ServiceExt;
use tower_sessions::session::{Id, Record};
use tower_sessions::{MemoryStore, SessionStore, session_store};
use url::Url;
use wiremock::MockServer;

/// Shared IPN secret used by every test app.
pub const IPN_SECRET: &str = "ipn-test-secret-7Qz2";

/// API key the mocked gateway expects.
pub const API_KEY: &str = "test-api-key-9fK2";

/// Public base URL of the test storefront.
pub const BASE_URL: &str = "http://shop.test";

/// Build a catalog product.
#[must_use]
pub fn product(id: i32, name: &str, price: Decimal) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_owned(),
        slug: name.to_lowercase().replace(' ', "-"),
        price,
        in_stock: true,
    }
}

/// Storefront configuration pointing at `gateway_url`.
#[must_use]
pub fn config(gateway_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused/test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: Url::parse(BASE_URL).unwrap(),
        cart: CartConfig::default(),
        payments: PaymentsConfig {
            api_url: Url::parse(&format!("{gateway_url}/v1")).unwrap(),
            api_key: SecretString::from(API_KEY),
            ipn_secret: SecretString::from(IPN_SECRET),
            currency: CurrencyCode::USD,
            request_timeout: Duration::from_secs(2),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// In-memory session store whose writes can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct SwitchableSessionStore {
    inner: MemoryStore,
    reject_writes: Arc<AtomicBool>,
}

impl SwitchableSessionStore {
    /// Make every later create or save fail.
    pub fn reject_writes(&self) {
        self.reject_writes.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> session_store::Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(session_store::Error::Backend("session store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SwitchableSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        self.check_writable()?;
        self.inner.create(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.check_writable()?;
        self.inner.save(record).await
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        self.inner.load(session_id).await
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.inner.delete(session_id).await
    }
}

/// One shopper talking to an in-process storefront.
pub struct TestApp {
    router: Router,
    cookie: Option<String>,
    pub catalog: MemoryCatalog,
    pub orders: MemoryOrderStore,
    pub sessions: SwitchableSessionStore,
    pub gateway: MockServer,
    verifier: WebhookVerifier,
}

impl TestApp {
    /// Start a storefront whose catalog holds `products`.
    pub async fn start(products: impl IntoIterator<Item = Product>) -> Self {
        Self::start_with_orders(products, MemoryOrderStore::new()).await
    }

    /// Start a storefront over a specific order store.
    pub async fn start_with_orders(
        products: impl IntoIterator<Item = Product>,
        orders: MemoryOrderStore,
    ) -> Self {
        let gateway = MockServer::start().await;
        let config = config(&gateway.uri());
        let catalog = MemoryCatalog::with_products(products);

        let sessions = SwitchableSessionStore::default();
        let session_layer = create_session_layer(sessions.clone(), &config);
        let verifier = WebhookVerifier::new(&config.payments.ipn_secret).unwrap();
        let state = AppState::with_collaborators(
            config,
            Arc::new(catalog.clone()),
            Arc::new(orders.clone()),
        )
        .unwrap();

        Self {
            router: routes::app(state, session_layer),
            cookie: None,
            catalog,
            orders,
            sessions,
            gateway,
            verifier,
        }
    }

    /// Send a request as this shopper, keeping the session cookie.
    pub async fn send(&mut self, mut request: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        let session_cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE_NAME}=")));
        if let Some(pair) = session_cookie {
            self.cookie = Some(pair.to_owned());
        }

        response
    }

    /// Drop the session cookie, as a different shopper would arrive.
    pub fn forget_session(&mut self) {
        self.cookie = None;
    }

    pub async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// POST an urlencoded form.
    pub async fn post_form(&mut self, uri: &str, form: &str) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_owned()))
                .unwrap(),
        )
        .await
    }

    /// Place an order for whatever is in the cart with valid details.
    pub async fn checkout(&mut self) -> Response {
        self.post_form(
            "/orders/create",
            "first_name=Ada&last_name=Lovelace&email=ada%40example.com\
             &address=1+Analytical+Way&postal_code=10001&city=London",
        )
        .await
    }

    /// Signature the gateway would send for `body`.
    #[must_use]
    pub fn sign(&self, body: &str) -> String {
        self.verifier
            .sign(&WebhookPayload::from_json(body.as_bytes()).unwrap())
    }

    /// Deliver an IPN callback. Webhooks carry no shopper cookie.
    pub async fn webhook(&self, body: &str, signature: Option<&str>) -> Response {
        let mut request = Request::post("/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::from(body.to_owned())).unwrap())
            .await
            .unwrap()
    }
}

/// Read a response body as JSON.
pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read a response body as text.
pub async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response) -> &str {
    assert!(
        response.status().is_redirection(),
        "expected redirect, got {}",
        response.status()
    );
    response.headers()[header::LOCATION].to_str().unwrap()
}
