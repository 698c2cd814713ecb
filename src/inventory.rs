use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::crawl::RegistryCrawl;
use crate::error::{AppError, Result};

/// Repository path -> tags, as listed by the registry
pub type Inventory = HashMap<String, Vec<String>>;

/// List the catalog, then the tags of every repository with at most
/// `concurrency` tag listings in flight.
///
/// The first failing listing aborts the rest; nothing partial is returned.
pub async fn collect<R>(registry: Arc<R>, concurrency: usize) -> Result<Inventory>
where
    R: RegistryCrawl + 'static,
{
    let repos = registry.list_repositories().await?;
    tracing::info!("catalog of {} lists {} repositories", registry.domain(), repos.len());

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for repo in repos {
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| AppError::tag_list(&repo, e))?;
            let tags = registry
                .list_tags(&repo)
                .await
                .inspect_err(|e| tracing::error!("get tags of [{}] failed: {}", repo, e))?;
            tracing::debug!("{}: {} tags", repo, tags.len());
            Ok::<_, AppError>((repo, tags))
        });
    }

    let mut inventory = Inventory::new();
    // Returning early drops the JoinSet, which aborts the outstanding listings
    while let Some(joined) = tasks.join_next().await {
        let (repo, tags) = joined??;
        inventory.insert(repo, tags);
    }

    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegistry;

    #[tokio::test]
    async fn test_collect_lists_every_repository() {
        let registry = FakeRegistry::new("registry.io")
            .with_list("rck", "latest", &["sha256:AAA"])
            .with_list("rck", "1.0", &["sha256:AAA"])
            .with_image("amd64/rck", "latest", "sha256:AAA")
            .with_image("s390x/rck", "latest", "sha256:BBB");

        let inventory = collect(Arc::new(registry), 4).await.unwrap();

        assert_eq!(inventory.len(), 3);
        assert_eq!(inventory["rck"], vec!["latest", "1.0"]);
        assert_eq!(inventory["amd64/rck"], vec!["latest"]);
        assert_eq!(inventory["s390x/rck"], vec!["latest"]);
    }

    #[tokio::test]
    async fn test_collect_empty_catalog() {
        let inventory = collect(Arc::new(FakeRegistry::new("registry.io")), 4)
            .await
            .unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_collect_fails_on_any_tag_listing_error() {
        let registry = FakeRegistry::new("registry.io")
            .with_image("amd64/rck", "latest", "sha256:AAA")
            .with_broken_tag_list("amd64/broken")
            .with_image("s390x/rck", "latest", "sha256:BBB");

        let err = collect(Arc::new(registry), 1).await.unwrap_err();
        assert!(matches!(err, AppError::TagList { ref repo, .. } if repo == "amd64/broken"));
    }

    #[tokio::test]
    async fn test_collect_reports_invalid_registry() {
        let registry = FakeRegistry::new("example.com").with_invalid_catalog();
        let err = collect(Arc::new(registry), 4).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRegistry { .. }));
    }
}
