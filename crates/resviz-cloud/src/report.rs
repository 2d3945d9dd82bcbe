//! Persisted run reports
//!
//! The latest [`CollectionResult`] per identity/region is kept under
//! `<state_dir>/reports/` so it can be inspected after the run exits.

use crate::assembler::CollectionResult;
use crate::error::{CloudError, Result};
use crate::fsutil::{self, path_component};
use crate::model::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const REPORTS_DIR: &str = "reports";

/// Compact machine-readable summary printed at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub identity: String,
    pub region: String,
    pub services: Vec<ResourceKind>,
    pub success_count: usize,
    pub total_count: usize,

    /// Record count per kind, 0 for failed kinds
    pub results: BTreeMap<ResourceKind, usize>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub errors: BTreeMap<ResourceKind, String>,
}

impl From<&CollectionResult> for RunSummary {
    fn from(result: &CollectionResult) -> Self {
        Self {
            success: result.success,
            identity: result.identity.clone(),
            region: result.region.clone(),
            services: result.requested_kinds.clone(),
            success_count: result.success_count,
            total_count: result.total_count,
            results: result
                .kinds
                .iter()
                .map(|k| (k.kind, k.record_count))
                .collect(),
            errors: result
                .kinds
                .iter()
                .filter_map(|k| k.error.as_ref().map(|e| (k.kind, e.to_string())))
                .collect(),
        }
    }
}

/// Stores the latest report per identity/region
#[derive(Debug, Clone)]
pub struct ReportStore {
    state_dir: PathBuf,
}

impl ReportStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn report_path(&self, identity: &str, region: &str) -> PathBuf {
        self.state_dir.join(REPORTS_DIR).join(format!(
            "report_{}@{}.json",
            path_component(identity),
            path_component(region)
        ))
    }

    /// Save a report, replacing the previous one atomically
    pub async fn save(&self, result: &CollectionResult) -> Result<PathBuf> {
        let path = self.report_path(&result.identity, &result.region);
        let content = serde_json::to_vec_pretty(result)?;
        fsutil::write_atomic(&path, &content)
            .await
            .map_err(|e| CloudError::ReportIo(format!("failed to write {}: {}", path.display(), e)))?;

        tracing::debug!("Saved report to {}", path.display());
        Ok(path)
    }

    /// Load the latest report, `None` if there is none
    pub async fn load(&self, identity: &str, region: &str) -> Result<Option<CollectionResult>> {
        let path = self.report_path(identity, region);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CloudError::ReportIo(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let result: CollectionResult = serde_json::from_slice(&content)
            .map_err(|e| CloudError::ReportIo(format!("corrupt report {}: {}", path.display(), e)))?;
        if result.identity != identity || result.region != region {
            tracing::warn!(
                "Report {} belongs to {}/{}, ignoring it",
                path.display(),
                result.identity,
                result.region
            );
            return Ok(None);
        }
        Ok(Some(result))
    }
}
