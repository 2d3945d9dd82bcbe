//! Collector tuning
//!
//! Built once per process and never mutated afterwards.

use crate::model::ResourceKind;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86_400);
pub const DEFAULT_MAX_RESOURCES_PER_KIND: usize = 1000;
pub const DEFAULT_PAGE_SIZE: i32 = 100;
pub const DEFAULT_REQUIRED_TAG: &str = "CostProject";

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Settings the orchestrator runs with
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Upper bound on kinds fetched at the same time
    pub max_concurrency: usize,

    pub cache_ttl: Duration,

    /// Records kept per kind; the rest of the listing is not requested
    pub max_resources_per_kind: usize,

    pub default_page_size: i32,

    pub page_sizes: BTreeMap<ResourceKind, i32>,

    pub retry: RetryConfig,

    /// Whole-run deadline. Kinds still pending when it passes time out.
    pub deadline: Option<Duration>,

    /// Tags a record must carry to count as compliant
    pub required_tags: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let page_sizes = BTreeMap::from([
            (ResourceKind::Ec2, 1000),
            (ResourceKind::Rds, 100),
            (ResourceKind::S3, 1000),
            (ResourceKind::Lambda, 50),
        ]);

        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_resources_per_kind: DEFAULT_MAX_RESOURCES_PER_KIND,
            default_page_size: DEFAULT_PAGE_SIZE,
            page_sizes,
            retry: RetryConfig::default(),
            deadline: None,
            required_tags: vec![DEFAULT_REQUIRED_TAG.to_string()],
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_resources_per_kind(mut self, max: usize) -> Self {
        self.max_resources_per_kind = max;
        self
    }

    pub fn with_page_size(mut self, kind: ResourceKind, size: i32) -> Self {
        self.page_sizes.insert(kind, size);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_required_tags(mut self, tags: Vec<String>) -> Self {
        self.required_tags = tags;
        self
    }

    pub fn page_size_for(&self, kind: ResourceKind) -> i32 {
        self.page_sizes
            .get(&kind)
            .copied()
            .unwrap_or(self.default_page_size)
    }
}
