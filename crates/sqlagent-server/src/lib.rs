//! HTTP front end for the SQL agent

pub mod error;
pub mod rest;
pub mod types;

pub use error::AppError;
pub use rest::{create_router, serve, AppState, LlmFactory};
pub use types::*;
