//! Shared types

pub mod error;

pub use error::{PlanError, Result};
