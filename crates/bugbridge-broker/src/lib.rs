//! HTTP broker for the bugbridge tracker integration.

pub mod config;
pub mod entitlement;
pub mod http;
pub mod rate_limit;
