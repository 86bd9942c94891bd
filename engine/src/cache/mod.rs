//! In-memory caches

pub mod outcomes;
