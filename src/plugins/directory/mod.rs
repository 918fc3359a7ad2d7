//! Directory service plugin
//!
//! The directory service is the slower global store repositories are cloned
//! from and published to. It also decides which repositories are pull-only.

pub mod http;
pub mod retry;
pub mod traits;

pub use http::{is_content_addressed, HttpDirectoryService};
pub use retry::RetryManager;
pub use traits::DirectoryService;

#[cfg(test)]
pub use traits::MockDirectoryService;
