//! Read-mostly taxonomy cache: one `Arc<TaxonomySnapshot>` shared by every
//! request, swapped wholesale on refresh.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::taxonomy::repository::TaxonomyRepository;
use crate::taxonomy::snapshot::TaxonomySnapshot;

pub struct TaxonomyCache {
    repository: Arc<dyn TaxonomyRepository>,
    current: RwLock<Arc<TaxonomySnapshot>>,
}

impl TaxonomyCache {
    pub async fn load(repository: Arc<dyn TaxonomyRepository>) -> Result<Self> {
        let snapshot = repository.load_snapshot().await?;
        Ok(Self::with_snapshot(repository, snapshot))
    }

    pub fn with_snapshot(repository: Arc<dyn TaxonomyRepository>, snapshot: TaxonomySnapshot) -> Self {
        Self {
            repository,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub async fn snapshot(&self) -> Arc<TaxonomySnapshot> {
        self.current.read().await.clone()
    }

    pub fn repository(&self) -> &Arc<dyn TaxonomyRepository> {
        &self.repository
    }

    /// Unconditional reload. Returns the new version.
    pub async fn refresh(&self) -> Result<i64> {
        let snapshot = self.repository.load_snapshot().await?;
        let version = snapshot.version;
        *self.current.write().await = Arc::new(snapshot);
        info!("Taxonomy snapshot refreshed to v{version}");
        Ok(version)
    }

    /// Reloads only when the stored version moved. Returns whether it did.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        let stored = self.repository.current_version().await?;
        let cached = self.current.read().await.version;
        if stored == cached {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }
}

/// Polls the stored version on an interval. Failures keep the old snapshot.
pub fn spawn_refresh_loop(cache: Arc<TaxonomyCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.refresh_if_stale().await {
                warn!("Taxonomy refresh failed, keeping cached snapshot: {e:?}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::fixtures::FakeTaxonomyRepository;

    #[tokio::test]
    async fn test_refresh_if_stale_only_reloads_on_version_change() {
        let repo = Arc::new(FakeTaxonomyRepository::default());
        let cache = TaxonomyCache::load(repo.clone()).await.unwrap();
        assert_eq!(cache.snapshot().await.version, 1);

        assert!(!cache.refresh_if_stale().await.unwrap());

        repo.bump_version();
        assert!(cache.refresh_if_stale().await.unwrap());
        assert_eq!(cache.snapshot().await.version, 2);
    }

    #[tokio::test]
    async fn test_outstanding_snapshot_survives_refresh() {
        let repo = Arc::new(FakeTaxonomyRepository::default());
        let cache = TaxonomyCache::load(repo.clone()).await.unwrap();
        let held = cache.snapshot().await;
        repo.bump_version();
        cache.refresh().await.unwrap();
        assert_eq!(held.version, 1);
        assert_eq!(cache.snapshot().await.version, 2);
    }
}
