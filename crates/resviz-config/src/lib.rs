pub mod environment;
pub mod error;
pub mod settings;

pub use environment::{RunEnvironment, RunType};
pub use error::*;
pub use settings::{LogSettings, RetrySettings, Settings, load_settings};

use std::path::PathBuf;

/// 設定ファイルを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "RESVIZ_CONFIG_PATH";

const SETTINGS_CANDIDATES: [&str; 4] = [
    "resviz.local.yaml",
    ".resviz.local.yaml",
    "resviz.yaml",
    ".resviz.yaml",
];

/// resvizの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("resviz");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 RESVIZ_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: resviz.local.yaml, .resviz.local.yaml, resviz.yaml, .resviz.yaml
/// 3. ~/.config/resviz/resviz.yaml (グローバル設定)
pub fn find_settings_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    // 2. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    for filename in &SETTINGS_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("resviz").join("resviz.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}
