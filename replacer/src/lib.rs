//! Native dependency replacer library.
//!
//! Prepares a deployment package for a Linux function runtime by swapping
//! host-compiled native dependencies for prebuilt replacements and then
//! tidying the bundled dependency trees. It is used by the `native-replacer`
//! binary and can be driven programmatically with custom collaborators.
//!
//! # Modules
//!
//! - [`artefact`] - Replacement download, unpacking and host-build purge
//! - [`catalog`] - Registry availability gate
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Configuration file loading and override resolution
//! - [`dependency_id`] - Dependency identifier with name/version split
//! - [`discovery`] - Native artifact scan and identifier extraction
//! - [`error`] - Semantic error types with recovery hints
//! - [`logging`] - `tracing-subscriber` setup that renders `log` records on stderr
//! - [`output`] - User-facing progress lines
//! - [`pipeline`] - Stage orchestration and the extraction worker pool
//! - [`tidy`] - Post-replacement pruning of dependency trees

pub mod artefact;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dependency_id;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod tidy;
