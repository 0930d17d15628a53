//! Irrigation advisor daemon internals: configuration and the
//! health/metrics HTTP API

pub mod api;
pub mod config;
