//! HTTP surface of the live migration router.

pub mod app;
pub mod config;
