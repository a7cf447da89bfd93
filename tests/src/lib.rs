//! # Feed Relay Test Suite
//!
//! Cross-crate scenarios that exercise several components together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Scripted transport, payload fixtures, polling helpers
//! └── integration/
//!     ├── e2e_pipeline.rs   # Provider → bus → connections, through RelayRuntime
//!     └── flows.rs          # Pairwise component interactions
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::e2e_pipeline::
//! ```

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

pub mod integration;
pub mod support;
