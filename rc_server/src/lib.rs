//! Race Cup tournament server.
//!
//! HTTP and WebSocket surface over the [`race_cup`] tournament coordinator.

pub mod api;
pub mod config;
pub mod logging;
