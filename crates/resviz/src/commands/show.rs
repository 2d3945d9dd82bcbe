use crate::TargetArgs;
use crate::app::App;
use chrono::Local;
use colored::Colorize;
use resviz_cloud::{
    AssembledRecord, CollectionResult, PageInfo, ResourceKind, TagFilter, filtered_counts,
    paginate, tag_values,
};

pub struct ShowOptions {
    pub service: Option<ResourceKind>,
    pub tags: Vec<String>,
    pub page: usize,
    pub page_size: usize,
}

/// 最新の収集結果を表で表示する
pub async fn handle(app: &App, target: &TargetArgs, options: ShowOptions) -> anyhow::Result<()> {
    let target = app.target(target.region.as_deref(), target.profile.as_deref());
    let filter: TagFilter = options.tags.join(",").parse()?;

    let Some(result) = app.reports().load(&target.identity, &target.region).await? else {
        println!(
            "{}",
            format!(
                "{} / {} の収集結果がありません。先に resviz collect を実行してください",
                target.identity, target.region
            )
            .yellow()
        );
        return Ok(());
    };

    print_header(&result);
    print_kind_summary(&result, &filter);

    let records: Vec<&AssembledRecord> = filter
        .apply(&result.records)
        .into_iter()
        .filter(|r| options.service.is_none_or(|kind| r.record.kind == kind))
        .collect();

    let (page, info) = paginate(&records, options.page_size, options.page);
    println!();
    if page.is_empty() {
        println!("{}", "条件に一致するリソースはありません".dimmed());
    } else {
        print_records(page);
    }
    print_page_info(&info);

    for key in app.settings.required_tags.iter() {
        let values = tag_values(&result.records, key);
        if !values.is_empty() {
            let values: Vec<_> = values.into_iter().collect();
            println!("{}: {}", key.bold(), values.join(", "));
        }
    }
    Ok(())
}

fn print_header(result: &CollectionResult) {
    let status = if result.success {
        "成功".green()
    } else {
        "失敗".red()
    };
    println!(
        "{} / {}  {}  ({})",
        result.identity.cyan(),
        result.region.cyan(),
        status,
        result
            .completed_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "サービス: {}/{} 成功  リソース: {}件  概算月額: ${:.2}",
        result.success_count,
        result.total_count,
        result.record_count(),
        result.total_estimated_monthly_cost
    );
}

fn print_kind_summary(result: &CollectionResult, filter: &TagFilter) {
    let counts = filtered_counts(result, filter);
    println!();
    for summary in &result.kinds {
        let label = format!("{:<8}", summary.kind.as_str());
        match &summary.error {
            None => println!(
                "  {} {} {:>5}件 ({})",
                "✓".green(),
                label,
                counts.get(&summary.kind).copied().unwrap_or(0),
                summary.source
            ),
            Some(e) => println!("  {} {} {}", "✗".red(), label, e.to_string().red()),
        }
    }
}

fn print_records(records: &[&AssembledRecord]) {
    println!(
        "{}",
        format!(
            "{:<8} {:<28} {:<28} {:<4} {:<30} {:>10}",
            "SERVICE", "ID", "NAME", "TAG", "REQUIRED TAGS", "COST/MO"
        )
        .bold()
    );
    println!("{}", "─".repeat(113).dimmed());

    for record in records {
        let compliant = if record.tag_compliant {
            "OK".green()
        } else {
            "NG".red()
        };
        println!(
            "{:<8} {:<28} {:<28} {:<4} {:<30} {:>10}",
            record.record.kind.as_str(),
            truncate(&record.record.id, 28).cyan(),
            truncate(&record.record.name, 28),
            compliant,
            truncate(&record.required_tags, 30),
            format!("${:.2}", record.estimated_monthly_cost)
        );
    }
}

fn print_page_info(info: &PageInfo) {
    if info.total_items == 0 {
        return;
    }
    println!();
    println!(
        "{}",
        format!(
            "{}-{} / {}件  (ページ {}/{})",
            info.start_index + 1,
            info.end_index,
            info.total_items,
            info.current_page,
            info.total_pages
        )
        .dimmed()
    );
    if info.has_next() {
        println!(
            "{}",
            format!("次のページ: --page {}", info.current_page + 1).dimmed()
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
