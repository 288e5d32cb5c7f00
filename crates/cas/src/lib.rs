//! Archive Store and Execution Cache for the batch execution engine.
//!
//! Two independent on-disk stores live in this crate: [`archive`] fetches and
//! refcounts repository zip archives; [`exec_cache`] maps a task's cache-key
//! digest to its cached `ExecutionResult`-shaped value.

pub mod archive;
pub mod error;
pub mod exec_cache;
pub mod http;

pub use archive::{ArchiveFetcher, ArchiveKey, ArchiveRef, ArchiveStore};
pub use error::{Error, Result};
pub use exec_cache::ExecutionCache;
pub use http::HttpArchiveFetcher;
