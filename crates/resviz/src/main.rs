mod app;
mod commands;
mod logging;

use clap::{Args, Parser, Subcommand};
use resviz_cloud::ResourceKind;

#[derive(Parser)]
#[command(name = "resviz")]
#[command(about = "クラウドリソースの棚卸しをまとめて取得・キャッシュするバッチツール", long_about = None)]
struct Cli {
    /// デバッグログを stderr にも出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// 収集対象の指定
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// AWSリージョン（省略時は設定の default_region）
    #[arg(short, long, env = "AWS_DEFAULT_REGION")]
    pub region: Option<String>,
    /// AWSプロファイル（ローカル実行時のみ。省略時は設定の default_profile）
    #[arg(short, long, env = "AWS_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// リソースを収集（結果はJSONで標準出力）
    Collect {
        #[command(flatten)]
        target: TargetArgs,
        /// 取得するサービス（複数指定可、省略時は全サービス）
        #[arg(short, long = "services", value_name = "SERVICE")]
        services: Vec<ResourceKind>,
        /// 収集前にキャッシュをクリア
        #[arg(long)]
        clear_cache: bool,
        /// 実行中ロックを無視して強制実行
        #[arg(long)]
        force: bool,
        /// キャッシュを読まずに取得（結果はキャッシュに書き込む）
        #[arg(long)]
        no_cache: bool,
        /// 同時に取得するサービス数の上限
        #[arg(long)]
        concurrency: Option<usize>,
        /// 収集全体の制限時間（秒）
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// 最新の実行状態を表示（JSON）
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// 最新の収集結果を表で表示
    Show {
        #[command(flatten)]
        target: TargetArgs,
        /// サービスで絞り込み
        #[arg(short, long)]
        service: Option<ResourceKind>,
        /// タグで絞り込み（Key=Value、複数指定はすべて一致）
        #[arg(short, long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
        /// ページ番号（1始まり）
        #[arg(long, default_value = "1")]
        page: usize,
        /// 1ページあたりの件数
        #[arg(long, default_value = "20")]
        page_size: usize,
    },
    /// キャッシュを管理
    #[command(subcommand)]
    Cache(CacheCommands),
    /// バージョン情報を表示
    Version,
}

/// キャッシュ管理のサブコマンド
#[derive(Subcommand)]
enum CacheCommands {
    /// キャッシュの鮮度を表示
    Info {
        #[command(flatten)]
        target: TargetArgs,
        /// 対象サービス（省略時は全サービス）
        #[arg(short, long = "services", value_name = "SERVICE")]
        services: Vec<ResourceKind>,
    },
    /// キャッシュを削除
    Clear {
        #[command(flatten)]
        target: TargetArgs,
        /// すべてのプロファイル・リージョンのキャッシュを削除
        #[arg(long)]
        all: bool,
    },
    /// キャッシュの使用量を表示
    Size,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("resviz {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let app = app::App::load()?;
    let guard = logging::init(&app.settings, cli.verbose);

    let success = match cli.command {
        Commands::Collect {
            target,
            services,
            clear_cache,
            force,
            no_cache,
            concurrency,
            deadline,
        } => {
            let options = commands::collect::CollectOptions {
                services,
                clear_cache,
                force,
                no_cache,
                concurrency,
                deadline,
            };
            commands::collect::handle(&app, &target, options).await?
        }
        Commands::Status { target } => {
            commands::status::handle(&app, &target).await?;
            true
        }
        Commands::Show {
            target,
            service,
            tags,
            page,
            page_size,
        } => {
            let options = commands::show::ShowOptions {
                service,
                tags,
                page,
                page_size,
            };
            commands::show::handle(&app, &target, options).await?;
            true
        }
        Commands::Cache(cache_cmd) => {
            match cache_cmd {
                CacheCommands::Info { target, services } => {
                    commands::cache::handle_info(&app, &target, services).await;
                }
                CacheCommands::Clear { target, all } => {
                    commands::cache::handle_clear(&app, &target, all).await?;
                }
                CacheCommands::Size => {
                    commands::cache::handle_size(&app).await?;
                }
            }
            true
        }
        Commands::Version => true,
    };

    if !success {
        // ログを書き切ってから終了する
        drop(guard);
        std::process::exit(1);
    }
    Ok(())
}
