use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, WWW_AUTHENTICATE};
use reqwest::{Client, Method, Response, StatusCode};
use sha2::{Digest as _, Sha256};

use crate::auth::{self, Challenge, Credentials, TokenResponse};
use crate::crawl::RegistryCrawl;
use crate::error::{AppError, Result};
use crate::models::{Catalog, Digest, ManifestList, TagList};

const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const MANIFEST_LIST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
const DIGEST_HEADER: &str = "Docker-Content-Digest";

const IMAGE_MEDIA_TYPES: [&str; 2] = [MANIFEST_V2_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE];
const LIST_MEDIA_TYPES: [&str; 2] = [MANIFEST_LIST_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE];

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub plain_http: bool,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            plain_http: false,
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

/// Registry V2 client for one domain.
///
/// Authorization headers obtained from challenges are cached per scope for the
/// lifetime of the client. Only one task per scope answers a challenge; the
/// others wait for it and reuse the result.
pub struct RegistryClient {
    client: Client,
    domain: String,
    base_url: String,
    credentials: Option<Credentials>,
    authorizations: RwLock<HashMap<String, String>>,
    challenge_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegistryClient {
    pub fn new(domain: &str, options: ClientOptions) -> Result<Self> {
        let domain = domain.trim_end_matches('/').to_string();
        let scheme = if options.plain_http { "http" } else { "https" };
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("archsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}://{}", scheme, domain),
            domain,
            credentials: options.credentials,
            authorizations: RwLock::new(HashMap::new()),
            challenge_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Send a request, answering one authentication challenge if the
    /// registry asks for it. `scope` keys the cached authorization.
    async fn send(&self, method: Method, url: &str, accept: &[&str], scope: &str) -> Result<Response> {
        tracing::debug!("{} {}", method, url);
        let cached = self.authorizations.read().get(scope).cloned();
        let resp = self
            .request(method.clone(), url, accept, cached.as_deref())
            .send()
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        if cached.is_some() {
            tracing::debug!("cached authorization for {} rejected, renewing", scope);
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(auth::parse_challenge)
            .ok_or_else(|| {
                AppError::Authentication(format!("{} {} returned 401 without a usable challenge", method, url))
            })?;

        let lock = Arc::clone(
            self.challenge_locks
                .lock()
                .entry(scope.to_string())
                .or_default(),
        );
        let _guard = lock.lock().await;
        // another task may have answered the challenge while we waited
        let renewed = self
            .authorizations
            .read()
            .get(scope)
            .filter(|a| Some(a.as_str()) != cached.as_deref())
            .cloned();
        let authorization = match renewed {
            Some(authorization) => authorization,
            None => {
                let authorization = self.authorize(&challenge).await?;
                self.authorizations
                    .write()
                    .insert(scope.to_string(), authorization.clone());
                authorization
            }
        };

        let resp = self
            .request(method.clone(), url, accept, Some(&authorization))
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::Authentication(format!(
                "{} {} rejected the credentials for {}",
                method, url, self.domain
            )));
        }
        Ok(resp)
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        accept: &[&str],
        authorization: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        if !accept.is_empty() {
            req = req.header(ACCEPT, accept.join(", "));
        }
        if let Some(authorization) = authorization {
            req = req.header(AUTHORIZATION, authorization);
        }
        req
    }

    /// Turn a challenge into an `Authorization` header value
    async fn authorize(&self, challenge: &Challenge) -> Result<String> {
        match challenge {
            Challenge::Basic => {
                let creds = self.credentials.as_ref().ok_or_else(|| {
                    AppError::Authentication(format!("{} requires credentials", self.domain))
                })?;
                let encoded = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
                Ok(format!("Basic {}", encoded))
            }
            Challenge::Bearer { realm, .. } => {
                tracing::debug!("requesting token from {}", realm);
                let mut req = self.client.get(realm).query(&challenge.token_query());
                if let Some(creds) = &self.credentials {
                    req = req.basic_auth(&creds.username, Some(&creds.password));
                }
                let resp = req.send().await.map_err(|e| {
                    AppError::Authentication(format!("token request to {} failed: {}", realm, e))
                })?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(AppError::Authentication(format!(
                        "token request to {} returned status {}",
                        realm, status
                    )));
                }

                let token: TokenResponse = resp.json().await.map_err(|e| {
                    AppError::Authentication(format!("invalid token response from {}: {}", realm, e))
                })?;
                let token = token.into_token().ok_or_else(|| {
                    AppError::Authentication(format!("token response from {} has no token", realm))
                })?;
                Ok(format!("Bearer {}", token))
            }
        }
    }

    /// Parse the Link header for pagination (next URL)
    fn parse_next_link(headers: &HeaderMap) -> Option<String> {
        let link = headers.get(LINK)?.to_str().ok()?;
        // Link: </v2/_catalog?n=100&last=xxx>; rel="next", </v2/...>; rel="prev"
        let value = link.split(',').find(|v| v.contains("rel=\"next\""))?;
        let start = value.find('<')? + 1;
        let end = start + value[start..].find('>')?;
        Some(value[start..end].to_string())
    }

    /// Resolve a relative URL path against the base URL
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}

/// Authentication failures keep their own category, everything else is
/// reported as a failure of the calling operation.
fn categorize(err: AppError, wrap: impl FnOnce(String) -> AppError) -> AppError {
    match err {
        AppError::Authentication(_) => err,
        other => wrap(other.to_string()),
    }
}

/// `sha256:<hex>` of a manifest body
fn digest_of(body: &[u8]) -> Digest {
    Digest::new(format!("sha256:{}", hex::encode(Sha256::digest(body))))
}

#[async_trait]
impl RegistryCrawl for RegistryClient {
    fn domain(&self) -> &str {
        &self.domain
    }

    /// GET /v2/_catalog with pagination
    async fn list_repositories(&self) -> Result<Vec<String>> {
        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog", self.base_url);

        loop {
            let resp = self
                .send(Method::GET, &url, &[], "registry:catalog:*")
                .await
                .map_err(|e| categorize(e, AppError::Catalog))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::Catalog(format!("GET {} returned status {}", url, status)));
            }

            let next_link = Self::parse_next_link(resp.headers());

            let body = resp
                .text()
                .await
                .map_err(|e| AppError::Catalog(format!("reading {}: {}", url, e)))?;
            let catalog: Catalog = serde_json::from_str(&body).map_err(|e| {
                tracing::debug!("catalog body is not JSON: {}", e);
                AppError::InvalidRegistry {
                    domain: self.domain.clone(),
                }
            })?;
            repos.extend(catalog.repositories);

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(repos)
    }

    /// GET /v2/<repo>/tags/list with pagination
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", self.base_url, repo);
        let scope = format!("repository:{}:pull", repo);

        loop {
            let resp = self
                .send(Method::GET, &url, &[], &scope)
                .await
                .map_err(|e| categorize(e, |m| AppError::tag_list(repo, m)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::tag_list(repo, format!("status {}", status)));
            }

            let next_link = Self::parse_next_link(resp.headers());

            let tag_list: TagList = resp
                .json()
                .await
                .map_err(|e| AppError::tag_list(repo, format!("invalid tag list: {}", e)))?;

            if let Some(t) = tag_list.tags {
                tags.extend(t);
            }

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(tags)
    }

    /// HEAD /v2/<repo>/manifests/<tag> — Docker-Content-Digest header,
    /// falling back to hashing the manifest body
    async fn fetch_digest(&self, repo: &str, tag: &str) -> Result<Digest> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, tag);
        let scope = format!("repository:{}:pull", repo);
        let fail = |m: String| AppError::fetch(repo, tag, m);

        let resp = self
            .send(Method::HEAD, &url, &IMAGE_MEDIA_TYPES, &scope)
            .await
            .map_err(|e| categorize(e, fail))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HEAD manifest returned status {}", status)));
        }

        if let Some(digest) = resp
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            return Ok(Digest::new(digest));
        }

        tracing::debug!("no {} header for {}:{}, hashing manifest", DIGEST_HEADER, repo, tag);
        let resp = self
            .send(Method::GET, &url, &IMAGE_MEDIA_TYPES, &scope)
            .await
            .map_err(|e| categorize(e, fail))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("GET manifest returned status {}", status)));
        }
        let body = resp.bytes().await.map_err(|e| fail(e.to_string()))?;
        Ok(digest_of(&body))
    }

    /// GET /v2/<repo>/manifests/<tag> as manifest list or OCI index
    async fn fetch_manifest_list(&self, repo: &str, tag: &str) -> Result<ManifestList> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, tag);
        let scope = format!("repository:{}:pull", repo);
        let fail = |m: String| AppError::fetch(repo, tag, m);

        let resp = self
            .send(Method::GET, &url, &LIST_MEDIA_TYPES, &scope)
            .await
            .map_err(|e| categorize(e, fail))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("GET manifest list returned status {}", status)));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        // a plain image under a top-level name declares no architectures
        if IMAGE_MEDIA_TYPES.iter().any(|t| content_type.starts_with(t)) {
            tracing::debug!("{}:{} is a single image ({}), treating as empty list", repo, tag, content_type);
            return Ok(ManifestList {
                schema_version: 2,
                manifests: Vec::new(),
            });
        }

        let body = resp.bytes().await.map_err(|e| fail(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| fail(format!("invalid manifest list: {}", e)))
    }
}
