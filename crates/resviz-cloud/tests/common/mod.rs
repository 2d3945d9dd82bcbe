use futures_util::{StreamExt, TryStreamExt, stream};
use resviz_cloud::{
    CacheStore, CollectorConfig, Collector, FetchError, FetchScope, FetcherRegistry,
    ProcessProbe, RecordStream, ReportStore, ResourceFetcher, ResourceKind, ResourceRecord,
    RetryConfig, RunLockRegistry,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// What a scripted fetch does when polled
#[derive(Debug, Clone)]
pub enum Step {
    Records(usize),
    Fail(FetchError),
}

/// Tracks how many fetches are in flight at once
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard(Arc<ConcurrencyGauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fetcher that replays a script, then repeats its last step
pub struct ScriptedFetcher {
    kind: ResourceKind,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Duration,
    calls: AtomicUsize,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl ScriptedFetcher {
    pub fn records(kind: ResourceKind, n: usize) -> Self {
        Self::scripted(kind, vec![Step::Records(n)])
    }

    pub fn failing(kind: ResourceKind, error: FetchError) -> Self {
        Self::scripted(kind, vec![Step::Fail(error)])
    }

    pub fn scripted(kind: ResourceKind, steps: Vec<Step>) -> Self {
        let fallback = steps.last().cloned().unwrap_or(Step::Records(0));
        Self {
            kind,
            script: Mutex::new(steps.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            gauge: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn make_records(kind: ResourceKind, n: usize) -> Vec<ResourceRecord> {
    (0..n)
        .map(|i| {
            ResourceRecord::new(kind, format!("{}-{:03}", kind.slug(), i))
                .with_tag("CostProject", "alpha")
        })
        .collect()
}

impl ResourceFetcher for ScriptedFetcher {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn fetch<'a>(&'a self, _scope: &'a FetchScope) -> RecordStream<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        let kind = self.kind;

        stream::once(async move {
            let _guard = self.gauge.as_ref().map(|g| g.enter());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match step {
                Step::Records(n) => Ok(make_records(kind, n)),
                Step::Fail(e) => Err(e),
            }
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, FetchError>)))
        .try_flatten()
        .boxed()
    }
}

/// Probe that reports a fixed liveness for every pid
pub struct FixedProbe(pub bool);

impl ProcessProbe for FixedProbe {
    fn is_alive(&self, _pid: u32) -> bool {
        self.0
    }
}

/// Temp directories plus a collector wired to them
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    pub fn cache(&self) -> CacheStore {
        CacheStore::new(self.cache_dir())
    }

    pub fn locks(&self) -> RunLockRegistry {
        RunLockRegistry::new(self.state_dir()).with_probe(Arc::new(FixedProbe(true)))
    }

    pub fn reports(&self) -> ReportStore {
        ReportStore::new(self.state_dir())
    }

    /// Fast retries so tests do not sleep for seconds
    pub fn config(&self) -> CollectorConfig {
        CollectorConfig::default().with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
        })
    }

    pub fn collector(&self, config: CollectorConfig, fetchers: &[Arc<ScriptedFetcher>]) -> Collector {
        let mut registry = FetcherRegistry::new();
        for fetcher in fetchers {
            registry.register(fetcher.clone());
        }
        Collector::new(config, self.cache(), self.locks(), registry).with_reports(self.reports())
    }
}
