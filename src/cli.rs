use std::time::Duration;

use clap::Parser;

use crate::arch::ArchSet;
use crate::error::AppError;
use crate::reconcile::Limits;

/// archsync — find multi-arch manifest lists that are out of sync with their
/// per-architecture images
#[derive(Parser, Debug)]
#[command(
    name = "archsync",
    version,
    about,
    after_help = "Docker credentials are read from ~/.docker/config.json unless --username/--password are given."
)]
pub struct Cli {
    /// Registry domain (e.g., registry.io or localhost:5000)
    #[arg(env = "ARCHSYNC_DOMAIN")]
    pub domain: String,

    /// Comma separated architecture prefixes to process
    #[arg(
        short = 'a',
        long = "archs",
        env = "ARCHSYNC_ARCHS",
        value_delimiter = ',',
        default_value = "amd64,s390x"
    )]
    pub archs: Vec<String>,

    /// Comma separated list of all architecture prefixes used in the registry
    #[arg(
        long = "all",
        env = "ARCHSYNC_ALL_ARCHS",
        value_delimiter = ',',
        default_value = "amd64,s390x,ppc64le,arm64"
    )]
    pub all_archs: Vec<String>,

    /// Registry user, overrides the docker config
    #[arg(short, long, env = "ARCHSYNC_USERNAME", requires = "password")]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long, env = "ARCHSYNC_PASSWORD", requires = "username", hide_env_values = true)]
    pub password: Option<String>,

    /// Use http:// instead of https://
    #[arg(long, default_value_t = false)]
    pub plain_http: bool,

    /// Repositories reconciled at the same time
    #[arg(long, default_value_t = 1)]
    pub repo_concurrency: usize,

    /// Registry requests in flight while listing tags and fetching manifests
    #[arg(long, default_value_t = 16)]
    pub tag_concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Validated settings of one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub domain: String,
    pub archs: ArchSet,
    pub limits: Limits,
    pub plain_http: bool,
    pub timeout: Duration,
    pub verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> Result<RunConfig, AppError> {
        let domain = self.domain.trim();
        if domain.is_empty() {
            return Err(AppError::Configuration("registry domain is required".into()));
        }

        let all_archs = non_blank(&self.all_archs);
        if all_archs.is_empty() {
            return Err(AppError::Configuration(
                "list of '--all' architectures not allowed to be empty".into(),
            ));
        }
        let archs = non_blank(&self.archs);
        if archs.is_empty() {
            return Err(AppError::Configuration(
                "list of '-a' architectures not allowed to be empty".into(),
            ));
        }
        for arch in archs.iter().filter(|a| !all_archs.contains(a)) {
            tracing::warn!(
                "architecture '{}' is not in '--all' and will be treated as an image name",
                arch
            );
        }

        if self.repo_concurrency == 0 || self.tag_concurrency == 0 {
            return Err(AppError::Configuration("concurrency must be at least 1".into()));
        }
        if self.timeout == 0 {
            return Err(AppError::Configuration("timeout must be at least 1 second".into()));
        }

        Ok(RunConfig {
            domain: domain.to_string(),
            archs: ArchSet::new(all_archs, archs),
            limits: Limits {
                repo_workers: self.repo_concurrency,
                tag_workers: self.tag_concurrency,
            },
            plain_http: self.plain_http,
            timeout: Duration::from_secs(self.timeout),
            verbose: self.verbose,
        })
    }
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("archsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["registry.io"]);
        assert_eq!(cli.archs, vec!["amd64", "s390x"]);
        assert_eq!(cli.all_archs, vec!["amd64", "s390x", "ppc64le", "arm64"]);

        let config = cli.to_config().unwrap();
        assert_eq!(config.domain, "registry.io");
        assert_eq!(config.archs.selected(), ["amd64", "s390x"]);
        assert_eq!(config.limits.repo_workers, 1);
        assert_eq!(config.limits.tag_workers, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_comma_separated_lists() {
        let cli = parse(&["-a", "arm64", "--all", "amd64,arm64", "registry.io"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.archs.selected(), ["arm64"]);
    }

    #[test]
    fn test_missing_domain_is_rejected() {
        assert!(Cli::try_parse_from(["archsync"]).is_err());
    }

    #[test]
    fn test_extra_positional_is_rejected() {
        assert!(Cli::try_parse_from(["archsync", "a.io", "b.io"]).is_err());
    }

    #[test]
    fn test_empty_arch_list_is_a_configuration_error() {
        let cli = parse(&["-a", "", "registry.io"]);
        let err = cli.to_config().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));

        let cli = parse(&["--all", " , ", "registry.io"]);
        assert!(matches!(cli.to_config(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_zero_concurrency_is_a_configuration_error() {
        let cli = parse(&["--tag-concurrency", "0", "registry.io"]);
        assert!(matches!(cli.to_config(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_username_requires_password() {
        assert!(Cli::try_parse_from(["archsync", "-u", "bob", "registry.io"]).is_err());
        let cli = parse(&["-u", "bob", "-p", "pw", "registry.io"]);
        assert_eq!(cli.username.as_deref(), Some("bob"));
    }
}
