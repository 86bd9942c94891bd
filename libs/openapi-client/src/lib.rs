//! Deployment registry API models

pub mod models;
