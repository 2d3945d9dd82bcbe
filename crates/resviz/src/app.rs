//! 設定からコアの部品を組み立てる

use resviz_cloud::{
    CacheStore, CollectorConfig, FlatRateEstimator, ReportStore, ResourceKind, RetryConfig,
    RunLockRegistry, identity_for_profile,
};
use resviz_config::{RunEnvironment, Settings};
use std::str::FromStr;
use std::time::Duration;

/// 収集対象 (リージョンとプロファイル)
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub region: String,
    pub profile: Option<String>,
    /// キャッシュ・ロックのキーになる名前
    pub identity: String,
}

pub struct App {
    pub settings: Settings,
    pub env: RunEnvironment,
}

impl App {
    pub fn new(settings: Settings, env: RunEnvironment) -> Self {
        Self { settings, env }
    }

    pub fn load() -> anyhow::Result<Self> {
        let settings = resviz_config::load_settings()?;
        let env = RunEnvironment::from_env()?;
        Ok(Self::new(settings, env))
    }

    /// 実行環境を考慮してリージョン・プロファイルを決める
    pub fn target(&self, region: Option<&str>, profile: Option<&str>) -> Target {
        let default_region = &self.settings.default_region;
        let region = self
            .env
            .effective_region(region.unwrap_or(default_region), default_region);
        let profile = self
            .env
            .effective_profile(Some(profile.unwrap_or(&self.settings.default_profile)));
        let identity = identity_for_profile(profile.as_deref());

        Target {
            region,
            profile,
            identity,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        let s = &self.settings;
        let retry = RetryConfig {
            max_attempts: s.retry.max_attempts,
            initial_delay: Duration::from_millis(s.retry.initial_delay_ms),
            max_delay: Duration::from_millis(s.retry.max_delay_ms),
            backoff_multiplier: s.retry.multiplier,
        };

        let mut config = CollectorConfig::new()
            .with_max_concurrency(s.max_concurrency)
            .with_cache_ttl(Duration::from_secs(s.cache_ttl_secs))
            .with_max_resources_per_kind(s.max_resources_per_kind)
            .with_retry(retry)
            .with_deadline(s.deadline_secs.map(Duration::from_secs))
            .with_required_tags(s.required_tags.clone());
        config.default_page_size = s.default_page_size;

        for (kind, size) in per_kind(&s.page_sizes, "page_sizes") {
            config = config.with_page_size(kind, size);
        }
        config
    }

    pub fn estimator(&self) -> FlatRateEstimator {
        FlatRateEstimator::from_rates(per_kind(&self.settings.estimated_costs, "estimated_costs"))
    }

    pub fn cache(&self) -> CacheStore {
        CacheStore::new(&self.settings.cache_dir)
            .with_ttl(Duration::from_secs(self.settings.cache_ttl_secs))
    }

    pub fn locks(&self) -> RunLockRegistry {
        RunLockRegistry::new(&self.settings.state_dir)
    }

    pub fn reports(&self) -> ReportStore {
        ReportStore::new(&self.settings.state_dir)
    }
}

/// 種別名をキーにしたマップを解釈する (不明な種別は警告して無視)
fn per_kind<'a, V: Copy + 'a>(
    map: impl IntoIterator<Item = (&'a String, &'a V)>,
    field: &str,
) -> Vec<(ResourceKind, V)> {
    map.into_iter()
        .filter_map(|(name, value)| match ResourceKind::from_str(name) {
            Ok(kind) => Some((kind, *value)),
            Err(_) => {
                tracing::warn!("{} の不明なリソース種別を無視します: {}", field, name);
                None
            }
        })
        .collect()
}
