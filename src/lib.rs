//! aigrader - backend relay for the AI grader web client
//!
//! This library provides the LLM gateway (payload building, transport,
//! error classification, answer extraction), configuration, and the HTTP
//! API that exposes grading, answer analysis and connection testing.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{CompletionRequest, Gateway, GatewayError};
