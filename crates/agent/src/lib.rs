//! Cluster monitor agent
//!
//! Polls every configured cluster member with the query catalog and serves
//! feed data, the shared time window, health and metrics over HTTP.

pub mod api;
pub mod config;
pub mod monitor;
