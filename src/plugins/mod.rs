//! Collaborator plugins
//!
//! This module contains the clients for services the gateway coordinates with:
//! - Directory service (global repository clone/publish and protection status)

pub mod directory;
