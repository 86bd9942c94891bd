//! Static-site deployment engine
//!
//! Clones a repository, builds it, publishes the artifact to a remote host
//! and wires up nginx routing and TLS for the site's domain.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod remote;
pub mod server;
pub mod storage;
pub mod utils;
