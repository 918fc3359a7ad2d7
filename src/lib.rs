//! global-registry-gateway - Global repository semantics in front of a container registry
//!
//! This crate provides a gateway that sits in front of an OCI registry and
//! lazily clones `latest` from a global directory on first read, refuses
//! overwrites of pull-only repositories, and publishes accepted writes back
//! to the directory.

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod otel;
pub mod plugins;
pub mod proxy;
pub mod server;
