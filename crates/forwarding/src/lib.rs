#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ForwardingError`)
//! - [`config`]: Forwarding configuration (`ForwardingConfig`, builder)
//! - [`appliance`]: Appliance abstraction (`ApplianceClient` trait)
//! - [`unifi`]: UniFi Network controller client (`UnifiClient`)
//! - [`reconciler`]: Diffing engine (`ForwardingReconciler`, `ReconcilePlan`)
//!
//! # Architecture
//!
//! ```text
//! desired rules ──► ForwardingReconciler.ensure_addresses()
//!                        │
//!                   list() ─► plan() ─► delete(stale) ─► create(missing)
//!                        │
//!                   ApplianceClient (UniFi)
//! ```

pub mod appliance;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod unifi;

// --- Public API Re-exports ---

// Appliance
pub use appliance::ApplianceClient;

// Configuration
pub use config::{ForwardingConfig, ForwardingConfigBuilder};

// Error
pub use error::ForwardingError;

// Reconciler
pub use reconciler::{ForwardingReconciler, ReconcilePlan, plan};

// UniFi
pub use unifi::UnifiClient;
