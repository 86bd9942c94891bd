//! Deployment module

pub mod certs;
pub mod fsm;
pub mod git;
pub mod locks;
pub mod nginx;
pub mod notifier;
pub mod pipeline;
pub mod routing;
pub mod tracker;
pub mod workspace;
