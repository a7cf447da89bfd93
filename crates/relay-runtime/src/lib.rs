//! # Relay Runtime Library
//!
//! Wires the relay components into one process. The binary entry point is
//! `main.rs`; the modules are public so the workspace test suite can drive
//! them directly.
//!
//! ## Data flow
//!
//! ```text
//! OddsIngestionJob ──acquire──→ TokenBucketLimiter
//!        │
//!        ├──GET──→ ResilientClient ──→ provider
//!        │
//!        └──publish──→ EventBus ──→ LiveNotifier ──→ ConnectionManager ──→ clients
//!                          │
//!                          └──→ ProjectionTrigger ──→ ProjectionUpdater
//!
//! HealthMonitor ──reads──→ EventBus::stats, breakers, connection registry
//! ```
//!
//! ## Modules
//!
//! - `config` - Runtime configuration (file + environment)
//! - `ports` - Collaborator traits
//! - `adapters` - In-memory collaborator implementations
//! - `handlers` - Bus subscribers
//! - `ingestion` - Provider polling jobs
//! - `monitor` - Health evaluation and alert levels
//! - `runtime` - Component ownership and lifecycle

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod monitor;
pub mod ports;
pub mod runtime;

pub use config::{MonitorConfig, ProviderConfig, RuntimeConfig};
pub use error::{IngestError, RuntimeError};
pub use ingestion::{IngestReport, OddsIngestionJob};
pub use monitor::{assess, AlertLevel, HealthMonitor, HealthReport};
pub use runtime::{Collaborators, RelayRuntime};
