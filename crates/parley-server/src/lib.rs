//! # parley-server
//!
//! axum routes over the streaming pipeline: run submission, per-session
//! WebSocket event streams, voice listing and sample download.

#![deny(unsafe_code)]

pub mod bridge;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, GenerationDefaults, ParleyServer, ServerConfig};
