use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, TryStreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::arch::{split_prefix, ArchSet, Namespace};
use crate::crawl::RegistryCrawl;
use crate::error::{AppError, Result};
use crate::inventory::Inventory;
use crate::models::{Digest, Discrepancy, Origin, RepoTag, UpdateRecord};

/// Digest counters of one top-level tag.
///
/// Architecture images count +1, entries of the top-level list count -1, so a
/// tag is in sync when every counter is back at zero. The sign tells whether a
/// digest is built but not declared (+) or declared but not built (-).
#[derive(Debug, Default)]
struct TagBalance {
    counts: HashMap<Digest, i64>,
    last_origin: HashMap<Digest, Origin>,
    archs: Vec<String>,
}

impl TagBalance {
    fn is_consistent(&self) -> bool {
        self.counts.values().all(|n| *n == 0)
    }

    fn discrepancies(&self) -> Vec<Discrepancy> {
        let mut out: Vec<Discrepancy> = self
            .counts
            .iter()
            .filter(|(_, n)| **n != 0)
            .map(|(digest, n)| Discrepancy {
                digest: digest.clone(),
                count: *n,
                last_origin: self
                    .last_origin
                    .get(digest)
                    .cloned()
                    .unwrap_or(Origin::TopLevel),
            })
            .collect();
        out.sort_by(|a, b| a.digest.cmp(&b.digest));
        out
    }
}

/// Per-tag digest balances of a whole run
#[derive(Debug, Default)]
pub struct Ledger {
    balances: HashMap<RepoTag, TagBalance>,
}

impl Ledger {
    /// An architecture image of `repo_tag` resolved to `digest`
    pub fn record_image(&mut self, repo_tag: RepoTag, arch: &str, digest: Digest) {
        tracing::trace!("digests[{}][{}] += 1", repo_tag, digest);
        let balance = self.balances.entry(repo_tag).or_default();
        *balance.counts.entry(digest.clone()).or_insert(0) += 1;
        balance
            .last_origin
            .insert(digest, Origin::Arch(arch.to_string()));
        balance.archs.push(arch.to_string());
    }

    /// The top-level list of `repo_tag` references `digests`
    pub fn record_list<I>(&mut self, repo_tag: RepoTag, digests: I)
    where
        I: IntoIterator<Item = Digest>,
    {
        let balance = self.balances.entry(repo_tag).or_default();
        for digest in digests {
            *balance.counts.entry(digest.clone()).or_insert(0) -= 1;
            balance.last_origin.insert(digest, Origin::TopLevel);
        }
    }

    /// Every tag whose balance did not come out even, sorted by tag
    pub fn updates(&self) -> Vec<UpdateRecord> {
        let mut updates: Vec<UpdateRecord> = self
            .balances
            .iter()
            .filter(|(_, balance)| !balance.is_consistent())
            .map(|(repo_tag, balance)| UpdateRecord {
                repo_tag: repo_tag.clone(),
                archs: balance.archs.clone(),
                discrepancies: balance.discrepancies(),
            })
            .collect();
        updates.sort_by(|a, b| a.repo_tag.cmp(&b.repo_tag));
        updates
    }
}

/// Bounds of the reconciliation fan-out
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Repositories reconciled at the same time
    pub repo_workers: usize,
    /// Digest and manifest-list fetches in flight across all workers
    pub tag_workers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            repo_workers: 1,
            tag_workers: 16,
        }
    }
}

/// What a repository contributes to the ledger
enum Role {
    Arch { arch: String, image: String },
    TopLevel,
}

pub struct Reconciler<R> {
    registry: Arc<R>,
    archs: ArchSet,
    limits: Limits,
    fetch_permits: Arc<Semaphore>,
}

impl<R> Reconciler<R>
where
    R: RegistryCrawl + 'static,
{
    pub fn new(registry: Arc<R>, archs: ArchSet, limits: Limits) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(limits.tag_workers.max(1)));
        Self {
            registry,
            archs,
            limits,
            fetch_permits,
        }
    }

    /// Fold every selected repository of `inventory` into one ledger and
    /// return the top-level tags that are out of sync.
    ///
    /// Any failed fetch aborts the run; no partial result is returned.
    pub async fn reconcile(&self, inventory: &Inventory) -> Result<Vec<UpdateRecord>> {
        let ledger = Arc::new(Mutex::new(Ledger::default()));

        let mut repos: Vec<(&String, &Vec<String>)> = inventory.iter().collect();
        repos.sort_by(|a, b| a.0.cmp(b.0));

        stream::iter(repos.into_iter().map(Ok::<_, AppError>))
            .try_for_each_concurrent(self.limits.repo_workers.max(1), |(repo, tags)| {
                self.reconcile_repo(repo, tags, Arc::clone(&ledger))
            })
            .await?;

        let updates = ledger.lock().updates();
        tracing::info!("{} manifest lists out of sync", updates.len());
        Ok(updates)
    }

    async fn reconcile_repo(
        &self,
        repo: &str,
        tags: &[String],
        ledger: Arc<Mutex<Ledger>>,
    ) -> Result<()> {
        let (prefix, rest) = split_prefix(repo);
        let namespace = self.archs.classify(prefix);
        tracing::trace!("{} classified as {:?}", repo, namespace.as_pair());
        let role = match namespace {
            Namespace::Skipped(arch) => {
                tracing::debug!("skipping {} ({} not selected)", repo, arch);
                return Ok(());
            }
            Namespace::Arch(arch) if rest.is_empty() => {
                tracing::warn!("skipping {}: no image path after architecture {}", repo, arch);
                return Ok(());
            }
            Namespace::Arch(arch) => Role::Arch {
                arch: arch.to_string(),
                image: rest.to_string(),
            },
            Namespace::TopLevel => Role::TopLevel,
        };

        let mut tasks = JoinSet::new();
        for tag in tags {
            tracing::debug!("{}:{}", repo, tag);
            let registry = Arc::clone(&self.registry);
            let permits = Arc::clone(&self.fetch_permits);
            let ledger = Arc::clone(&ledger);
            let repo = repo.to_string();
            let tag = tag.clone();

            match &role {
                Role::Arch { arch, image } => {
                    let arch = arch.clone();
                    let image = image.clone();
                    tasks.spawn(async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| AppError::fetch(&repo, &tag, e))?;
                        tracing::debug!("get digest for {}/{}:{}", registry.domain(), repo, tag);
                        let digest = registry.fetch_digest(&repo, &tag).await?;
                        ledger
                            .lock()
                            .record_image(RepoTag::new(image, tag), &arch, digest);
                        Ok::<_, AppError>(())
                    });
                }
                Role::TopLevel => {
                    tasks.spawn(async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| AppError::fetch(&repo, &tag, e))?;
                        let list = registry.fetch_manifest_list(&repo, &tag).await?;
                        ledger.lock().record_list(
                            RepoTag::new(repo, tag),
                            list.manifests.into_iter().map(|m| m.digest),
                        );
                        Ok::<_, AppError>(())
                    });
                }
            }
        }

        // Returning early drops the JoinSet, which aborts the remaining fetches
        while let Some(joined) = tasks.join_next().await {
            joined??;
        }
        Ok(())
    }
}
