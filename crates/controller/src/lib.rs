#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ControllerError`)
//! - [`config`]: Runtime settings (`ControllerSettings`)
//! - [`workload`]: Pod view and store (`WorkloadRecord`, `WorkloadStore`, `KubeWorkloadStore`)
//! - [`extract`]: Desired rule derivation (`desired_rules`)
//! - [`lifecycle`]: Per-event state machine (`LifecycleGuard`, `PassOutcome`)
//! - [`runtime`]: kube runtime wiring (`PodController`)
//!
//! # Architecture
//!
//! ```text
//! kube watcher ──► Controller (per-key serialized)
//!                      │
//!        LifecycleGuard.reconcile_observed() (cached Pod, managed only)
//!                      │
//!        desired_rules() ─► ForwardingReconciler ─► ApplianceClient
//!                      │
//!                 finalizer attach/detach (WorkloadStore)
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod runtime;
pub mod workload;

// --- Public API Re-exports ---

pub use config::ControllerSettings;
pub use error::ControllerError;
pub use extract::desired_rules;
pub use lifecycle::{LifecycleGuard, PassOutcome, WorkloadPhase};
pub use runtime::{PodController, ReconcileContext, ReconcileStats, error_policy, reconcile_pod};
pub use workload::{KubeWorkloadStore, PortDeclaration, WorkloadKey, WorkloadRecord, WorkloadStore};
