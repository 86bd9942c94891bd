//! HTTP API models for the sitedeploy engine

pub mod models;
