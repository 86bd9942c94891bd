//! Outbound HTTP

pub mod client;
pub mod registry;
