//! Remote State Lookup
//!
//! Read-only view over the remote drive metadata maintained by the external
//! crawler. The conflict classifier consults it to decide whether a local
//! change collides with something already published.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Known remote state for one published file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    /// Network-level identifier of the published entity
    pub remote_id: String,
    /// Drive-relative path the file is published under
    pub path: PathBuf,
    /// Published file name
    pub file_name: String,
    /// Hex digest of the published content, when known
    pub content_hash: Option<String>,
    /// Published size in bytes
    pub size: u64,
    /// Whether the file is currently hidden from the drive listing
    pub hidden: bool,
    /// Unix timestamp of the last remote mutation, when known
    pub modified_at: Option<i64>,
}

/// Lookup into the crawled remote metadata.
///
/// `find` matches by path first and falls back to content hash, so a file
/// that moved locally can still be matched to its remote counterpart.
/// Returns `Ok(None)` when no remote counterpart exists.
#[async_trait]
pub trait RemoteStateLookup: Send + Sync {
    async fn find(
        &self,
        local_path: &Path,
        content_hash: Option<&str>,
    ) -> Result<Option<RemoteDescriptor>>;
}
