//! Cross-crate integration scenarios.

pub mod e2e_pipeline;
pub mod flows;
