//! Registry credentials and `WWW-Authenticate` challenges.
//!
//! Credentials come from the command line or, like the docker CLI does it,
//! from `auths` in `$DOCKER_CONFIG/config.json` (default `~/.docker/config.json`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: BTreeMap<String, AuthEntry>,
    #[serde(rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    identitytoken: Option<String>,
}

/// Credentials for `domain`: explicit ones first, then the docker config.
/// `Ok(None)` means anonymous access.
pub fn resolve(
    username: Option<&str>,
    password: Option<&str>,
    domain: &str,
) -> Result<Option<Credentials>> {
    if let (Some(username), Some(password)) = (username, password) {
        tracing::debug!("using credentials of {} from the command line", username);
        return Ok(Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }));
    }

    match docker_config_path() {
        Some(path) => from_docker_config(&path, domain),
        None => Ok(None),
    }
}

fn docker_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

/// Look up `domain` in a docker `config.json`. A missing file is not an error.
pub fn from_docker_config(path: &Path, domain: &str) -> Result<Option<Credentials>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no docker config at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(AppError::Authentication(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };
    let config: DockerConfig = serde_json::from_str(&raw).map_err(|e| {
        AppError::Authentication(format!("malformed docker config {}: {}", path.display(), e))
    })?;

    // exact keys first, then any URL-shaped key naming the same host
    let entry = [
        domain.to_string(),
        format!("https://{}", domain),
        format!("http://{}", domain),
    ]
    .iter()
    .find_map(|key| config.auths.get(key))
    .or_else(|| {
        config
            .auths
            .iter()
            .find(|(key, _)| registry_host(key) == domain)
            .map(|(_, entry)| entry)
    });

    let Some(entry) = entry else {
        if let Some(store) = &config.creds_store {
            tracing::debug!(
                "no inline credentials for {}; credential store '{}' is not supported",
                domain,
                store
            );
        }
        return Ok(None);
    };

    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        return decode_auth(auth, domain).map(Some);
    }
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Ok(Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }));
    }
    if entry.identitytoken.is_some() {
        tracing::debug!("identity token for {} is not supported, going anonymous", domain);
    }
    Ok(None)
}

/// `https://host:5000/v1/` -> `host:5000`
fn registry_host(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

fn decode_auth(auth: &str, domain: &str) -> Result<Credentials> {
    let bytes = STANDARD
        .decode(auth.trim())
        .map_err(|e| AppError::Authentication(format!("invalid auth for {}: {}", domain, e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AppError::Authentication(format!("invalid auth for {}: {}", domain, e)))?;
    let (username, password) = text.split_once(':').ok_or_else(|| {
        AppError::Authentication(format!("auth for {} is not user:password", domain))
    })?;
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// A parsed `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    /// Query parameters of the token request
    pub fn token_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Challenge::Bearer { service, scope, .. } = self {
            if let Some(service) = service {
                query.push(("service", service.clone()));
            }
            if let Some(scope) = scope {
                query.push(("scope", scope.clone()));
            }
        }
        query
    }
}

/// Parse `Bearer realm="...",service="...",scope="..."` or `Basic realm="..."`.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let params = parse_params(params);
    let realm = params.get("realm")?.clone();
    Some(Challenge::Bearer {
        realm,
        service: params.get("service").cloned(),
        scope: params.get("scope").cloned(),
    })
}

// Values may be quoted and quoted values may contain commas (`scope="repo:a:pull,push"`)
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim(), &after[end..]),
                None => (after.trim(), ""),
            }
        };

        params.insert(key, value.to_string());
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    params
}

/// Token server response; registries use either field name
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
}

impl TokenResponse {
    pub fn into_token(self) -> Option<String> {
        self.token.or(self.access_token).filter(|t| !t.is_empty())
    }
}
