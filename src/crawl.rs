use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Digest, ManifestList};

/// The registry operations the inventory and reconciliation phases need.
///
/// Calls are issued concurrently from many tasks, so implementations must be
/// safe to share. Latency bounds are the implementation's business.
#[async_trait]
pub trait RegistryCrawl: Send + Sync {
    /// Domain the registry is served from, e.g. `registry.io`
    fn domain(&self) -> &str;

    /// Every repository in the catalog
    async fn list_repositories(&self) -> Result<Vec<String>>;

    /// Tags of one repository
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>>;

    /// Digest of a single-architecture image manifest
    async fn fetch_digest(&self, repo: &str, tag: &str) -> Result<Digest>;

    /// Manifest list (or OCI index) behind a top-level tag
    async fn fetch_manifest_list(&self, repo: &str, tag: &str) -> Result<ManifestList>;
}
