//! FinQuery Core
//!
//! Types and utilities shared by the FinQuery classifiers and server.
//!
//! This crate provides:
//! - Error types and result handling
//! - Query text normalization applied before every prediction

pub mod error;
pub mod text;

pub use error::{Error, Result};
pub use text::normalize;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::text::normalize;
}
