//! REST API and push channel.
//!
//! HTTP endpoints for submitting and managing jobs, plus the WebSocket
//! update stream.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
