use crate::TargetArgs;
use crate::app::App;
use resviz_cloud::{CollectionRequest, Collector, ResourceKind, RunSummary};
use resviz_cloud_aws::{AwsContext, aws_fetchers};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub struct CollectOptions {
    pub services: Vec<ResourceKind>,
    pub clear_cache: bool,
    pub force: bool,
    pub no_cache: bool,
    pub concurrency: Option<usize>,
    pub deadline: Option<u64>,
}

/// 失敗時に標準出力へ出す JSON
#[derive(Serialize)]
struct FailureOutput<'a> {
    success: bool,
    error: String,
    services: &'a [ResourceKind],
    region: &'a str,
}

/// 収集を1回実行する
///
/// 結果の JSON を標準出力に出し、全体として成功したかを返す。
pub async fn handle(app: &App, target: &TargetArgs, options: CollectOptions) -> anyhow::Result<bool> {
    let target = app.target(target.region.as_deref(), target.profile.as_deref());
    let services = if options.services.is_empty() {
        ResourceKind::ALL.to_vec()
    } else {
        options.services
    };

    tracing::info!("=== resviz 収集開始 ===");
    tracing::info!(
        "引数: services={:?}, region={}, profile={:?}, clear_cache={}, force={}, no_cache={}",
        services,
        target.region,
        target.profile,
        options.clear_cache,
        options.force,
        options.no_cache
    );

    let request = match CollectionRequest::new(&target.identity, &target.region, services.clone()) {
        Ok(request) => request
            .with_clear_cache(options.clear_cache)
            .with_force(options.force)
            .with_bypass_cache(options.no_cache),
        Err(e) => return report_failure(&e.to_string(), &services, &target.region),
    };

    let mut config = app.collector_config();
    if let Some(concurrency) = options.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    if let Some(secs) = options.deadline {
        config = config.with_deadline(Some(Duration::from_secs(secs)));
    }

    let ctx = AwsContext::load(&target.region, target.profile.as_deref()).await;
    let collector = Collector::new(config, app.cache(), app.locks(), aws_fetchers(&ctx))
        .with_estimator(Arc::new(app.estimator()))
        .with_reports(app.reports());

    let result = match collector.collect(request).await {
        Ok(result) => result,
        Err(e) => {
            if e.is_duplicate_run() {
                tracing::error!("同じ条件で収集が実行中です: {}", e);
            }
            return report_failure(&e.to_string(), &services, &target.region);
        }
    };

    for kind in &result.kinds {
        match &kind.error {
            None => tracing::info!(
                "  {}: {}件取得 ({}, {}ms)",
                kind.kind,
                kind.record_count,
                kind.source,
                kind.duration_ms
            ),
            Some(e) => tracing::warn!("  {}: 取得失敗 ({})", kind.kind, e),
        }
    }

    let summary = RunSummary::from(&result);
    println!("{}", serde_json::to_string(&summary)?);
    tracing::info!(
        "=== resviz 収集終了: {}/{} サービス成功 ===",
        result.success_count,
        result.total_count
    );

    Ok(result.success)
}

fn report_failure(
    error: &str,
    services: &[ResourceKind],
    region: &str,
) -> anyhow::Result<bool> {
    tracing::error!("収集に失敗しました: {}", error);
    let output = FailureOutput {
        success: false,
        error: error.to_string(),
        services,
        region,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(false)
}
