//! Startup benchmark service
//!
//! Exposes `POST /measure`, which creates a deployment and reports how long
//! it takes to answer its health check.

pub mod api;
pub mod config;
