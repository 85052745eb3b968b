//! File storage for the `/files/` routes
//!
//! Files live directly under a configured directory and are addressed by the
//! name taken from the request path.

pub mod files;

pub use files::{FileStore, StoreError};
