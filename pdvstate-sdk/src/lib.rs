//! Shared wire types for the pdvstate collector API.
//!
//! The `client` feature adds [`client::CollectorClient`], a typed HTTP
//! client for the three collector endpoints used by the terminal agent.

#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
