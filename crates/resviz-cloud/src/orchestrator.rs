//! Collection orchestrator
//!
//! Runs one [`CollectionRequest`] end to end:
//!
//! 1. take the run lock for the identity/region
//! 2. collect every requested kind, at most `max_concurrency` at a time,
//!    from the cache when possible and from the provider otherwise
//! 3. merge the outcomes, release the lock, persist the report
//!
//! A failing kind never affects the others. Only a held lock or an invalid
//! request aborts a run.

use crate::assembler::{CollectionResult, CostEstimator, ResultAssembler};
use crate::cache::CacheStore;
use crate::config::CollectorConfig;
use crate::error::{CloudError, FetchError, Result};
use crate::fetcher::{FetchScope, FetcherRegistry, ResourceFetcher};
use crate::lock::{Acquisition, RunLockRegistry};
use crate::model::{CollectionRequest, ResourceKind, ResourceRecord};
use crate::outcome::KindOutcome;
use crate::report::ReportStore;
use crate::status::{self, ExecutionInfo};
use chrono::Utc;
use futures_util::future::join_all;
use futures_util::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep, timeout_at};

/// Orchestrates collection runs
#[derive(Debug, Clone)]
pub struct Collector {
    config: Arc<CollectorConfig>,
    cache: CacheStore,
    locks: RunLockRegistry,
    reports: Option<ReportStore>,
    fetchers: FetcherRegistry,
    assembler: ResultAssembler,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        cache: CacheStore,
        locks: RunLockRegistry,
        fetchers: FetcherRegistry,
    ) -> Self {
        let assembler = ResultAssembler::new(
            config.required_tags.clone(),
            Arc::new(crate::assembler::FlatRateEstimator::default()),
        );
        let cache = cache.with_ttl(config.cache_ttl);
        Self {
            config: Arc::new(config),
            cache,
            locks,
            reports: None,
            fetchers,
            assembler,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn CostEstimator>) -> Self {
        self.assembler = ResultAssembler::new(self.config.required_tags.clone(), estimator);
        self
    }

    /// Persist every finished run's report here
    pub fn with_reports(mut self, reports: ReportStore) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn locks(&self) -> &RunLockRegistry {
        &self.locks
    }

    pub fn reports(&self) -> Option<&ReportStore> {
        self.reports.as_ref()
    }

    pub fn assembler(&self) -> &ResultAssembler {
        &self.assembler
    }

    /// Run a collection
    ///
    /// Fails only when the request names an unregistered kind or another live
    /// run holds the lock. Per-kind failures are inside the result.
    pub async fn collect(&self, request: CollectionRequest) -> Result<CollectionResult> {
        if let Some(&kind) = request.kinds().iter().find(|k| !self.fetchers.contains(**k)) {
            return Err(CloudError::FetcherNotRegistered(kind));
        }

        let identity = request.identity();
        let region = request.region();

        let lock = match self
            .locks
            .try_acquire(identity, region, request.kinds(), request.force())
            .await
        {
            Acquisition::Acquired(lock) => lock,
            Acquisition::Rejected { holder } => {
                return Err(CloudError::DuplicateRun {
                    identity: identity.to_string(),
                    region: region.to_string(),
                    holder_pid: holder.pid,
                    since: holder.started_at,
                });
            }
        };

        tracing::info!(
            "Starting collection for {}/{}: {}",
            identity,
            region,
            kinds_label(request.kinds())
        );

        if request.clear_cache() {
            match self.cache.clear(Some(identity), Some(region)).await {
                Ok(removed) => tracing::info!("Cleared {} cache entries before fetch", removed),
                Err(e) => tracing::warn!("Failed to clear cache before fetch: {}", e),
            }
        }

        let outcomes = self.collect_kinds(&request).await;
        let result = self.assembler.assemble(&request, &outcomes, Utc::now());

        if let Err(e) = lock.release().await {
            tracing::warn!("Failed to release run lock for {}/{}: {}", identity, region, e);
        }

        if let Some(reports) = &self.reports
            && let Err(e) = reports.save(&result).await
        {
            tracing::warn!("Failed to persist report: {}", e);
        }

        tracing::info!(
            "Collection finished for {}/{}: {}/{} kinds succeeded, {} records",
            identity,
            region,
            result.success_count,
            result.total_count,
            result.record_count()
        );
        Ok(result)
    }

    /// Latest run status for an identity/region
    pub async fn execution_info(&self, identity: &str, region: &str) -> Option<ExecutionInfo> {
        let reports = self.reports.as_ref()?;
        Some(status::execution_info(&self.locks, reports, identity, region).await)
    }

    async fn collect_kinds(&self, request: &CollectionRequest) -> Vec<KindOutcome> {
        let limiter = Semaphore::new(self.config.max_concurrency.max(1));
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let started = Instant::now();

        let tasks = request.kinds().iter().map(|&kind| {
            let limiter = &limiter;
            async move {
                let work = async {
                    let Ok(_permit) = limiter.acquire().await else {
                        return KindOutcome::failed(
                            kind,
                            FetchError::provider("LimiterClosed", "concurrency limiter closed"),
                            0,
                            elapsed_ms(started),
                        );
                    };
                    self.collect_kind(request, kind).await
                };

                match deadline {
                    Some(deadline) => match timeout_at(deadline, work).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let elapsed = elapsed_ms(started);
                            tracing::warn!("{} timed out after {}ms", kind, elapsed);
                            KindOutcome::failed(
                                kind,
                                FetchError::Timeout {
                                    elapsed_ms: elapsed,
                                },
                                0,
                                elapsed,
                            )
                        }
                    },
                    None => work.await,
                }
            }
        });

        join_all(tasks).await
    }

    async fn collect_kind(&self, request: &CollectionRequest, kind: ResourceKind) -> KindOutcome {
        let started = Instant::now();
        let identity = request.identity();
        let region = request.region();
        tracing::debug!("{}: collecting for {}/{}", kind, identity, region);

        if !request.bypass_cache() {
            if let Some(records) = self.cache.get(identity, region, kind).await {
                tracing::info!("{}: {} records from cache", kind, records.len());
                return KindOutcome::cached(kind, records, elapsed_ms(started));
            }
            tracing::debug!("{}: cache miss", kind);
        }

        let Some(fetcher) = self.fetchers.get(kind) else {
            return KindOutcome::failed(
                kind,
                FetchError::provider("FetcherNotRegistered", kind.to_string()),
                0,
                elapsed_ms(started),
            );
        };

        let scope = FetchScope::new(identity, region, self.config.page_size_for(kind));
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(fetcher.as_ref(), &scope).await {
                Ok(records) => {
                    if let Err(e) = self.cache.put(identity, region, kind, &records).await {
                        tracing::warn!("{}: failed to write cache, keeping fetched data: {}", kind, e);
                    }
                    tracing::info!(
                        "{}: fetched {} records (attempt {})",
                        kind,
                        records.len(),
                        attempt
                    );
                    return KindOutcome::fetched(kind, records, attempt, elapsed_ms(started));
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = retry.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        kind,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("{}: fetch failed after {} attempt(s): {}", kind, attempt, e);
                    return KindOutcome::failed(kind, e, attempt, elapsed_ms(started));
                }
            }
        }
    }

    /// One complete listing, truncated at the per-kind cap
    async fn fetch_once(
        &self,
        fetcher: &dyn ResourceFetcher,
        scope: &FetchScope,
    ) -> std::result::Result<Vec<ResourceRecord>, FetchError> {
        fetcher
            .fetch(scope)
            .take(self.config.max_resources_per_kind)
            .try_collect()
            .await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn kinds_label(kinds: &[ResourceKind]) -> String {
    kinds
        .iter()
        .map(ResourceKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
