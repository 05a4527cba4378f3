//! flowdeck HTTP server
//!
//! Resolves credentials at startup, registers the built-in flows and serves
//! them over HTTP.

pub mod config;
pub mod error;
pub mod flows;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod state;
