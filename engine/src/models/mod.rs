//! Data models

pub mod attempt;
pub mod deployment;
pub mod outcome;
