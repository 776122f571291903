//! Facility Wallet HTTP API Service.
//!
//! This crate provides the HTTP API for facility wallets, including:
//!
//! - Wallet balance and ledger history
//! - Analysis charges priced by the pricing table
//! - Paystack top-ups (initialize, verify, cancel, retry)
//! - Paystack webhooks
//! - Admin pricing, credits and reconciliation
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **JWT bearer tokens** - The `sub` claim is the facility id
//! 2. **Admin API key** - `X-Admin-Key` for privileged endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod pricing;
pub mod routes;
pub mod state;
pub mod topup;
pub mod wallet;

pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use gateway::{GatewayError, PaymentGateway, PaystackClient};
pub use pricing::PricingResolver;
pub use routes::create_router;
pub use state::AppState;
pub use topup::{TopUpSession, TopUpWorkflow};
pub use wallet::{Reconciliation, WalletService};
