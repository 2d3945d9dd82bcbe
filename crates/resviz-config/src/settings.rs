//! 設定ファイル (YAML)
//!
//! すべての項目にデフォルト値があり、設定ファイルがなくても動作する。

use crate::error::{ConfigError, Result};
use crate::find_settings_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CACHE_DIR_ENV: &str = "RESVIZ_CACHE_DIR";
pub const STATE_DIR_ENV: &str = "RESVIZ_STATE_DIR";
pub const LOG_DIR_ENV: &str = "RESVIZ_LOG_DIR";

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// 未指定なら `<state_dir>/logs`
    pub dir: Option<PathBuf>,
    pub filename: String,
    pub level: String,
    /// 現在のファイルに加えて保持する日数
    pub retention_days: usize,
    /// 標準エラー出力にもログを出す
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            filename: "batch_execution.log".to_string(),
            level: "info".to_string(),
            retention_days: 7,
            console: false,
        }
    }
}

/// リトライ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// resviz 全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log: LogSettings,
    pub default_region: String,
    pub default_profile: String,
    /// 選択可能なプロファイル
    pub profiles: Vec<String>,
    /// 対応リージョン
    pub regions: Vec<String>,
    pub cache_ttl_secs: u64,
    pub max_concurrency: usize,
    pub max_resources_per_kind: usize,
    pub default_page_size: i32,
    /// リソース種別名 (EC2, RDS, S3, Lambda) ごとのページサイズ
    pub page_sizes: BTreeMap<String, i32>,
    pub required_tags: Vec<String>,
    /// リソース種別名ごとの月額想定コスト (USD)
    pub estimated_costs: BTreeMap<String, f64>,
    pub retry: RetrySettings,
    /// 1回の収集全体の制限時間 (秒)
    pub deadline_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("resviz");
        let state_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("resviz");

        Self {
            cache_dir,
            state_dir,
            log: LogSettings::default(),
            default_region: "us-east-1".to_string(),
            default_profile: "sandbox".to_string(),
            profiles: vec!["sandbox".to_string(), "demo".to_string()],
            regions: vec!["us-east-1".to_string(), "ap-northeast-1".to_string()],
            cache_ttl_secs: 86_400,
            max_concurrency: 5,
            max_resources_per_kind: 1000,
            default_page_size: 100,
            page_sizes: BTreeMap::from([
                ("EC2".to_string(), 1000),
                ("RDS".to_string(), 100),
                ("S3".to_string(), 1000),
                ("Lambda".to_string(), 50),
            ]),
            required_tags: vec!["CostProject".to_string()],
            estimated_costs: BTreeMap::from([
                ("EC2".to_string(), 50.0),
                ("RDS".to_string(), 100.0),
                ("S3".to_string(), 5.0),
                ("Lambda".to_string(), 1.0),
            ]),
            retry: RetrySettings::default(),
            deadline_secs: Some(600),
        }
    }
}

impl Settings {
    /// YAML ファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // 空ファイルはデフォルト扱い
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// 環境変数によるディレクトリの上書き
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_path(CACHE_DIR_ENV) {
            self.cache_dir = dir;
        }
        if let Some(dir) = env_path(STATE_DIR_ENV) {
            self.state_dir = dir;
        }
        if let Some(dir) = env_path(LOG_DIR_ENV) {
            self.log.dir = Some(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency は 1 以上を指定してください".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts は 1 以上を指定してください".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier は 1.0 以上を指定してください".into(),
            ));
        }
        if self.default_region.trim().is_empty() {
            return Err(ConfigError::Invalid("default_region が空です".into()));
        }
        if let Some((kind, size)) = self.page_sizes.iter().find(|(_, size)| **size <= 0) {
            return Err(ConfigError::Invalid(format!(
                "page_sizes.{} は 1 以上を指定してください (指定値: {})",
                kind, size
            )));
        }
        Ok(())
    }

    /// ログ出力先ディレクトリ
    pub fn log_dir(&self) -> PathBuf {
        self.log
            .dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("logs"))
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// 設定を読み込む
///
/// 設定ファイルが見つからなければデフォルト値を使う。
/// 環境変数による上書きを適用してから検証する。
pub fn load_settings() -> Result<Settings> {
    let mut settings = match find_settings_file() {
        Ok(path) => Settings::from_file(&path)?,
        Err(ConfigError::SettingsFileNotFound) => Settings::default(),
        Err(e) => return Err(e),
    };
    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}
