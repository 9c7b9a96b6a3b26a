//! Merges independently sourced Mastodon domain blocklists into one
//! conflict-resolved list.

pub mod api;
pub mod block;
pub mod config;
pub mod error;
pub mod export;
pub mod merge;
pub mod parse;

pub use block::{normalize_domain, DomainBlock, Field, Severity};
pub use error::{Error, Result};
pub use merge::{apply_mergeplan, merge_blocklists, merge_comments, Blocklist, MergePlan};
