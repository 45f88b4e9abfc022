//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::config::StorefrontConfig;
use crate::db::{Catalog, OrderStore, PgCatalog, PgOrderStore};
use crate::payments::{GatewayClient, GatewayError, SignatureError, WebhookVerifier};

/// Error assembling application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),
    #[error("webhook verifier: {0}")]
    Verifier(#[from] SignatureError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// configuration and the storage and gateway collaborators.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    gateway: GatewayClient,
    verifier: WebhookVerifier,
}

impl AppState {
    /// Create application state backed by `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client or webhook verifier cannot be
    /// built from the configuration.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        Self::with_collaborators(
            config,
            Arc::new(PgCatalog::new(pool.clone())),
            Arc::new(PgOrderStore::new(pool)),
        )
    }

    /// Create application state with explicit catalog and order storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client or webhook verifier cannot be
    /// built from the configuration.
    pub fn with_collaborators(
        config: StorefrontConfig,
        catalog: Arc<dyn Catalog>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self, StateError> {
        let gateway = GatewayClient::new(&config)?;
        let verifier = WebhookVerifier::new(&config.payments.ipn_secret)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                orders,
                gateway,
                verifier,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Product lookup.
    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        self.inner.catalog.as_ref()
    }

    /// Order storage.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    /// Payment gateway client.
    #[must_use]
    pub fn gateway(&self) -> &GatewayClient {
        &self.inner.gateway
    }

    /// Webhook signature verifier.
    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.inner.verifier
    }
}
