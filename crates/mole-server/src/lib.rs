//! HTTP and WebSocket front end for mole rendezvous slots
//!
//! Binds [`mole_rendezvous`] to axum routes, renders the listener and
//! sender pages, and serves static assets.

#![forbid(unsafe_code)]

pub mod config;
pub mod pages;
pub mod server;
pub mod websocket;

pub use config::{ConfigError, ServerConfig};
pub use server::{build_router, MoleServer, ServerState};
