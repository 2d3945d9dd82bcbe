use crate::TargetArgs;
use crate::app::App;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use resviz_cloud::{CacheStatus, ResourceKind};

pub async fn handle_info(app: &App, target: &TargetArgs, services: Vec<ResourceKind>) {
    let target = app.target(target.region.as_deref(), target.profile.as_deref());
    let services = if services.is_empty() {
        ResourceKind::ALL.to_vec()
    } else {
        services
    };

    let cache = app.cache();
    let summary = cache
        .summary(&target.identity, &target.region, &services)
        .await;

    println!(
        "キャッシュ: {} / {}",
        target.identity.cyan(),
        target.region.cyan()
    );
    println!("  場所: {}", cache.root().display().to_string().dimmed());
    println!();
    println!(
        "{}",
        format!(
            "{:<10} {:<8} {:>8} {:<20} {:<20}",
            "SERVICE", "STATUS", "RECORDS", "FETCHED", "EXPIRES"
        )
        .bold()
    );
    println!("{}", "─".repeat(70).dimmed());

    for entry in &summary.entries {
        let status = match entry.status {
            CacheStatus::Valid => "valid".green(),
            CacheStatus::Absent => "absent".dimmed(),
        };
        println!(
            "{:<10} {:<8} {:>8} {:<20} {:<20}",
            entry.kind.as_str(),
            status,
            entry.record_count,
            format_time(entry.written_at),
            format_time(entry.expires_at)
        );
    }

    println!();
    if summary.has_any() {
        println!(
            "有効: {}/{}  最終取得: {}  最短期限: {}",
            summary.valid_entries.to_string().green(),
            summary.total_kinds,
            format_time(summary.latest_write),
            format_time(summary.earliest_expiry)
        );
    } else {
        println!("{}", "有効なキャッシュはありません".yellow());
    }
}

pub async fn handle_clear(app: &App, target: &TargetArgs, all: bool) -> anyhow::Result<()> {
    let cache = app.cache();
    let removed = if all {
        cache.clear(None, None).await?
    } else {
        let target = app.target(target.region.as_deref(), target.profile.as_deref());
        cache
            .clear(Some(&target.identity), Some(&target.region))
            .await?
    };

    println!("{}", format!("✓ キャッシュを {} 件削除しました", removed).green());
    Ok(())
}

pub async fn handle_size(app: &App) -> anyhow::Result<()> {
    let cache = app.cache();
    let size = cache.size().await?;

    println!("キャッシュ: {}", cache.root().display().to_string().dimmed());
    println!("  エントリ数: {}", size.entries.to_string().cyan());
    println!("  サイズ: {}", format_bytes(size.bytes).cyan());
    Ok(())
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
