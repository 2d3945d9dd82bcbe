use crate::TargetArgs;
use crate::app::App;
use resviz_cloud::execution_info;

/// 実行状態を JSON で表示する
///
/// `status` は running / completed / failed / not_found のいずれか。
pub async fn handle(app: &App, target: &TargetArgs) -> anyhow::Result<()> {
    let target = app.target(target.region.as_deref(), target.profile.as_deref());
    let info = execution_info(&app.locks(), &app.reports(), &target.identity, &target.region).await;

    let status = info
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "not_found".to_string());

    let output = serde_json::json!({
        "status": status,
        "identity": info.identity,
        "region": info.region,
        "running": info.running,
        "last_run": info.last_run,
        "last_completed_at": info.last_completed_at,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
