//! Application state.

use std::sync::Arc;

use facility_wallet_store::Store;
use tokio::sync::RwLock;

use crate::auth::JwksCache;
use crate::config::ServiceConfig;
use crate::gateway::{PaymentGateway, PaystackClient};
use crate::pricing::PricingResolver;
use crate::topup::{TopUpSettings, TopUpWorkflow};
use crate::wallet::WalletService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Payment gateway (optional; top-ups are unavailable without it).
    pub gateway: Option<Arc<dyn PaymentGateway>>,

    /// Analysis pricing.
    pub pricing: PricingResolver,

    /// Wallet operations.
    pub wallets: WalletService,

    /// Top-up workflow.
    pub topups: TopUpWorkflow,

    /// JWKS key cache for JWT validation.
    pub jwks: Arc<RwLock<JwksCache>>,
}

impl AppState {
    /// Create a new application state, building the Paystack client from
    /// the configuration when a secret key is present.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let gateway = config.paystack_secret_key.as_ref().and_then(|key| {
            match PaystackClient::new(
                config.paystack_base_url.clone(),
                key.clone(),
                config.webhook_secret().map(String::from),
            ) {
                Ok(client) => {
                    tracing::info!(base_url = %config.paystack_base_url, "Paystack integration enabled");
                    Some(Arc::new(client) as Arc<dyn PaymentGateway>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Paystack client");
                    None
                }
            }
        });

        if gateway.is_none() {
            tracing::warn!("Paystack not configured - top-ups will not be available");
        }

        Self::with_gateway(store, config, gateway)
    }

    /// Create a new application state with an explicit payment gateway.
    #[must_use]
    pub fn with_gateway(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let pricing = PricingResolver::new(store.clone(), config.price_defaults.clone());
        let wallets = WalletService::new(store.clone(), pricing.clone(), config.currency.clone());
        let topups = TopUpWorkflow::new(
            store.clone(),
            gateway.clone(),
            TopUpSettings {
                currency: config.currency.clone(),
                min_amount: config.topup_min_amount,
                max_amount: config.topup_max_amount,
                callback_url: config.topup_callback_url.clone(),
            },
        );

        Self {
            store,
            config,
            gateway,
            pricing,
            wallets,
            topups,
            jwks: Arc::new(RwLock::new(JwksCache::new())),
        }
    }

    /// Check if a payment gateway is configured.
    #[must_use]
    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }
}
