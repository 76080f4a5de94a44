//! HTTP API consumed by the grader web client.
//!
//! Routes parse and validate the client's JSON, call the gateway, and
//! render either the extracted answer or a `{error, details?}` body.

pub mod data_url;
mod handlers;
mod server;
pub mod types;

pub use handlers::{ANALYSIS_PROMPT, CONNECTION_TEST_MAX_TOKENS, CONNECTION_TEST_PROMPT};
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
