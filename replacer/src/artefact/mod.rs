//! Fetching and unpacking replacement artifacts.
//!
//! # Sub-modules
//!
//! - [`download`] - Artifact download trait and HTTP implementation.
//! - [`extraction`] - Archive unpacking with path traversal protection.
//! - [`replacement`] - Per-dependency download, verify, purge and unpack.

pub mod download;
pub mod extraction;
pub mod replacement;
