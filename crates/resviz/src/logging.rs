//! ログ出力の初期化
//!
//! 日次ローテートのファイル (`batch_execution.log.YYYY-MM-DD`) に出力する。
//! stdout は JSON の結果出力に使うため、コンソール出力は stderr に出す。

use resviz_config::Settings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// ロギングを初期化する
///
/// 返されたガードを保持している間、ファイルへの書き込みが行われる。
/// ログディレクトリが使えない場合は stderr のみに出力する。
pub fn init(settings: &Settings, verbose: bool) -> Option<WorkerGuard> {
    let level = if verbose { "debug" } else { settings.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = settings.log_dir();
    let appender = std::fs::create_dir_all(&log_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&settings.log.filename)
                // 当日分 + 保持日数
                .max_log_files(settings.log.retention_days + 1)
                .build(&log_dir)
                .map_err(|e| e.to_string())
        });

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            let console_layer = (settings.log.console || verbose).then(|| {
                tracing_subscriber::fmt::layer().with_writer(std::io::stderr)
            });

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(console_layer)
                .try_init();
            Some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            tracing::warn!(
                "ログディレクトリを使用できません ({}): {}",
                log_dir.display(),
                e
            );
            None
        }
    }
}
