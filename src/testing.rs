//! In-memory registry used by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::crawl::RegistryCrawl;
use crate::error::{AppError, Result};
use crate::models::{Digest, ManifestDescriptor, ManifestList};

#[derive(Default)]
pub struct FakeRegistry {
    domain: String,
    tags: BTreeMap<String, Vec<String>>,
    digests: HashMap<(String, String), Digest>,
    lists: HashMap<(String, String), Vec<Digest>>,
    broken_tag_lists: HashSet<String>,
    invalid_catalog: bool,
    fetched: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..Default::default()
        }
    }

    /// Register a single-architecture image, e.g. `("amd64/rck", "latest", "sha256:AAA")`
    pub fn with_image(mut self, repo: &str, tag: &str, digest: &str) -> Self {
        self.add_tag(repo, tag);
        self.digests
            .insert((repo.to_string(), tag.to_string()), Digest::new(digest));
        self
    }

    /// Register a top-level manifest list referencing `digests`
    pub fn with_list(mut self, repo: &str, tag: &str, digests: &[&str]) -> Self {
        self.add_tag(repo, tag);
        self.lists.insert(
            (repo.to_string(), tag.to_string()),
            digests.iter().map(|d| Digest::new(*d)).collect(),
        );
        self
    }

    /// A tag that is listed but whose manifest cannot be fetched
    pub fn with_dangling_tag(mut self, repo: &str, tag: &str) -> Self {
        self.add_tag(repo, tag);
        self
    }

    pub fn with_broken_tag_list(mut self, repo: &str) -> Self {
        self.tags.entry(repo.to_string()).or_default();
        self.broken_tag_lists.insert(repo.to_string());
        self
    }

    pub fn with_invalid_catalog(mut self) -> Self {
        self.invalid_catalog = true;
        self
    }

    /// `repo:tag` of every digest or manifest-list fetch, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    fn add_tag(&mut self, repo: &str, tag: &str) {
        let tags = self.tags.entry(repo.to_string()).or_default();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    fn record(&self, repo: &str, tag: &str) {
        self.fetched.lock().push(format!("{}:{}", repo, tag));
    }
}

#[async_trait]
impl RegistryCrawl for FakeRegistry {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        if self.invalid_catalog {
            return Err(AppError::InvalidRegistry {
                domain: self.domain.clone(),
            });
        }
        Ok(self.tags.keys().cloned().collect())
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        if self.broken_tag_lists.contains(repo) {
            return Err(AppError::tag_list(repo, "status 500 Internal Server Error"));
        }
        self.tags
            .get(repo)
            .cloned()
            .ok_or_else(|| AppError::tag_list(repo, "status 404 Not Found"))
    }

    async fn fetch_digest(&self, repo: &str, tag: &str) -> Result<Digest> {
        self.record(repo, tag);
        tokio::task::yield_now().await;
        self.digests
            .get(&(repo.to_string(), tag.to_string()))
            .cloned()
            .ok_or_else(|| AppError::fetch(repo, tag, "manifest unknown"))
    }

    async fn fetch_manifest_list(&self, repo: &str, tag: &str) -> Result<ManifestList> {
        self.record(repo, tag);
        tokio::task::yield_now().await;
        let digests = self
            .lists
            .get(&(repo.to_string(), tag.to_string()))
            .ok_or_else(|| AppError::fetch(repo, tag, "manifest unknown"))?;
        Ok(ManifestList {
            schema_version: 2,
            manifests: digests
                .iter()
                .map(|d| ManifestDescriptor {
                    media_type: "application/vnd.docker.distribution.manifest.v2+json".into(),
                    size: 0,
                    digest: d.clone(),
                    platform: None,
                })
                .collect(),
        })
    }
}
