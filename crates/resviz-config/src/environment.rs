//! 実行環境 (ローカル / Docker / ECS)
//!
//! ECS ではタスクロールで認証するため、プロファイルは使わず
//! リージョンもタスクの環境変数から決まる。

use crate::error::{ConfigError, Result};
use std::fmt;
use std::str::FromStr;

pub const RUN_TYPE_ENV: &str = "RESVIZ_RUN_TYPE";
const AWS_REGION_ENV: &str = "AWS_DEFAULT_REGION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunType {
    #[default]
    Local,
    Docker,
    Ecs,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Local => "local",
            RunType::Docker => "docker",
            RunType::Ecs => "ecs",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(RunType::Local),
            "docker" => Ok(RunType::Docker),
            "ecs" => Ok(RunType::Ecs),
            other => Err(ConfigError::UnknownRunType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunEnvironment {
    run_type: RunType,
    aws_default_region: Option<String>,
}

impl RunEnvironment {
    pub fn new(run_type: RunType) -> Self {
        Self {
            run_type,
            aws_default_region: None,
        }
    }

    pub fn with_aws_default_region(mut self, region: impl Into<String>) -> Self {
        self.aws_default_region = Some(region.into());
        self
    }

    /// 環境変数 RESVIZ_RUN_TYPE と AWS_DEFAULT_REGION から構築
    pub fn from_env() -> Result<Self> {
        let run_type = match std::env::var(RUN_TYPE_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => RunType::default(),
        };
        let aws_default_region = std::env::var(AWS_REGION_ENV)
            .ok()
            .filter(|r| !r.trim().is_empty());

        Ok(Self {
            run_type,
            aws_default_region,
        })
    }

    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    /// 実際に使うリージョン
    ///
    /// ECS では AWS_DEFAULT_REGION、未設定ならデフォルトリージョン。
    /// それ以外は指定されたリージョン。
    pub fn effective_region(&self, requested: &str, default_region: &str) -> String {
        match self.run_type {
            RunType::Ecs => self
                .aws_default_region
                .clone()
                .unwrap_or_else(|| default_region.to_string()),
            RunType::Local | RunType::Docker => requested.to_string(),
        }
    }

    /// 実際に使うプロファイル (ECS ではタスクロールを使うので None)
    pub fn effective_profile(&self, requested: Option<&str>) -> Option<String> {
        match self.run_type {
            RunType::Ecs => None,
            RunType::Local | RunType::Docker => requested.map(str::to_string),
        }
    }
}
