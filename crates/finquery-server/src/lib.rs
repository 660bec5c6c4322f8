//! FinQuery Server
//!
//! HTTP front end for the FinQuery intent classifiers: a categorizer page per
//! backend, form-encoded categorize endpoints, health and Prometheus metrics.

pub mod cli;
pub mod config;
pub mod error;
pub mod pages;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, Backend};
