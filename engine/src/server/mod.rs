//! HTTP surface

pub mod handlers;
pub mod intake;
pub mod serve;
pub mod state;
