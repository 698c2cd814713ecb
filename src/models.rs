use std::fmt;

use serde::Deserialize;

/// GET /v2/_catalog response
#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub repositories: Vec<String>,
}

/// GET /v2/<repo>/tags/list response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TagList {
    pub name: String,
    pub tags: Option<Vec<String>>,
}

/// GET /v2/<repo>/manifests/<tag> for a manifest list or OCI image index
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestList {
    #[serde(rename = "schemaVersion")]
    #[allow(dead_code)]
    pub schema_version: u32,
    #[serde(default)]
    pub manifests: Vec<ManifestDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ManifestDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: Digest,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
}

/// Content identifier of a manifest, e.g. `sha256:...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(value: impl Into<String>) -> Self {
        Digest(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Architecture-stripped repository plus tag, the unit of reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoTag {
    pub repository: String,
    pub tag: String,
}

impl RepoTag {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for RepoTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Who last moved a digest counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Arch(String),
    TopLevel,
}

/// A nonzero digest counter of an out-of-sync manifest list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub digest: Digest,
    pub count: i64,
    pub last_origin: Origin,
}

/// A top-level manifest list that must be rebuilt from its architecture images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub repo_tag: RepoTag,
    pub archs: Vec<String>,
    pub discrepancies: Vec<Discrepancy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_tag_display() {
        let rt = RepoTag::new("library/rck", "latest");
        assert_eq!(rt.to_string(), "library/rck:latest");
    }

    #[test]
    fn test_manifest_list_parses_oci_index() {
        let body = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "size": 525,
                    "digest": "sha256:aaa",
                    "platform": {"architecture": "amd64", "os": "linux"}
                },
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "size": 525,
                    "digest": "sha256:bbb",
                    "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}
                }
            ]
        }"#;
        let list: ManifestList = serde_json::from_str(body).unwrap();
        assert_eq!(list.manifests.len(), 2);
        assert_eq!(list.manifests[0].digest, Digest::new("sha256:aaa"));
        let platform = list.manifests[1].platform.as_ref().unwrap();
        assert_eq!(platform.variant.as_deref(), Some("v8"));
    }

    #[test]
    fn test_manifest_list_without_manifests_is_empty() {
        let list: ManifestList = serde_json::from_str(r#"{"schemaVersion": 2}"#).unwrap();
        assert!(list.manifests.is_empty());
    }

    #[test]
    fn test_tag_list_null_tags() {
        let list: TagList = serde_json::from_str(r#"{"name": "rck", "tags": null}"#).unwrap();
        assert!(list.tags.is_none());
    }
}
