//! Local and remote command execution

pub mod executor;
pub mod runner;
