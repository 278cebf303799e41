//! vsctl Core Library
//!
//! This crate provides the foundational utilities for the vsctl CLI:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - The in-memory operator credential

pub mod config;
pub mod credential;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::AppConfig;
pub use credential::Credential;
pub use error::{AppError, AppResult};
