//! Merge per-kind outcomes into one report
//!
//! Assembly is pure: the same request, outcomes and completion time always
//! produce the same [`CollectionResult`], byte for byte once serialized.

use crate::error::FetchError;
use crate::model::{CollectionRequest, ResourceKind, ResourceRecord};
use crate::outcome::{KindOutcome, OutcomeSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Monthly cost estimate for a record
pub trait CostEstimator: Send + Sync {
    fn estimate(&self, record: &ResourceRecord) -> f64;
}

/// Fixed monthly price per kind
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRateEstimator {
    rates: BTreeMap<ResourceKind, f64>,
}

impl Default for FlatRateEstimator {
    fn default() -> Self {
        Self {
            rates: BTreeMap::from([
                (ResourceKind::Ec2, 50.0),
                (ResourceKind::Rds, 100.0),
                (ResourceKind::S3, 5.0),
                (ResourceKind::Lambda, 1.0),
            ]),
        }
    }
}

impl FlatRateEstimator {
    pub fn from_rates(rates: impl IntoIterator<Item = (ResourceKind, f64)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    pub fn rate(&self, kind: ResourceKind) -> f64 {
        self.rates.get(&kind).copied().unwrap_or(0.0)
    }
}

impl CostEstimator for FlatRateEstimator {
    fn estimate(&self, record: &ResourceRecord) -> f64 {
        self.rate(record.kind)
    }
}

/// A record annotated for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledRecord {
    #[serde(flatten)]
    pub record: ResourceRecord,

    /// Every required tag is present with a non-empty value
    pub tag_compliant: bool,

    /// Required tags the record carries, as `Key:Value` pairs
    pub required_tags: String,

    pub estimated_monthly_cost: f64,
}

/// Per-kind line of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: ResourceKind,
    pub success: bool,
    pub record_count: usize,
    pub source: OutcomeSource,
    pub attempts: u32,
    pub duration_ms: u64,
    pub estimated_monthly_cost: f64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<FetchError>,
}

/// Merged outcome of one collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    /// At least one requested kind succeeded
    pub success: bool,
    pub identity: String,
    pub region: String,
    pub requested_kinds: Vec<ResourceKind>,
    pub succeeded_kinds: Vec<ResourceKind>,
    pub failed_kinds: Vec<ResourceKind>,
    pub success_count: usize,
    pub total_count: usize,
    pub kinds: Vec<KindSummary>,
    pub records: Vec<AssembledRecord>,
    pub total_estimated_monthly_cost: f64,
    pub completed_at: DateTime<Utc>,
}

impl CollectionResult {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records_for(&self, kind: ResourceKind) -> impl Iterator<Item = &AssembledRecord> {
        self.records.iter().filter(move |r| r.record.kind == kind)
    }

    pub fn kind_summary(&self, kind: ResourceKind) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

/// Builds [`CollectionResult`]s
#[derive(Clone)]
pub struct ResultAssembler {
    required_tags: Vec<String>,
    estimator: Arc<dyn CostEstimator>,
}

impl fmt::Debug for ResultAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAssembler")
            .field("required_tags", &self.required_tags)
            .finish_non_exhaustive()
    }
}

impl ResultAssembler {
    pub fn new(required_tags: Vec<String>, estimator: Arc<dyn CostEstimator>) -> Self {
        Self {
            required_tags,
            estimator,
        }
    }

    pub fn required_tags(&self) -> &[String] {
        &self.required_tags
    }

    pub fn is_tag_compliant(&self, record: &ResourceRecord) -> bool {
        self.required_tags
            .iter()
            .all(|key| record.tag(key).is_some_and(|v| !v.trim().is_empty()))
    }

    /// `CostProject:alpha, Owner:ops` for the required tags a record carries
    pub fn required_tags_display(&self, record: &ResourceRecord) -> String {
        self.required_tags
            .iter()
            .filter_map(|key| record.tag(key).map(|value| format!("{}:{}", key, value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Merge outcomes in request order
    ///
    /// A requested kind with no outcome is reported as a provider failure.
    pub fn assemble(
        &self,
        request: &CollectionRequest,
        outcomes: &[KindOutcome],
        completed_at: DateTime<Utc>,
    ) -> CollectionResult {
        let mut kinds = Vec::with_capacity(request.kinds().len());
        let mut records = Vec::new();
        let mut succeeded_kinds = Vec::new();
        let mut failed_kinds = Vec::new();

        for &kind in request.kinds() {
            let Some(outcome) = outcomes.iter().find(|o| o.kind == kind) else {
                failed_kinds.push(kind);
                kinds.push(KindSummary {
                    kind,
                    success: false,
                    record_count: 0,
                    source: OutcomeSource::Provider,
                    attempts: 0,
                    duration_ms: 0,
                    estimated_monthly_cost: 0.0,
                    error: Some(FetchError::provider(
                        "MissingOutcome",
                        format!("no outcome recorded for {}", kind),
                    )),
                });
                continue;
            };

            let mut kind_cost = 0.0;
            for record in outcome.records() {
                let cost = self.estimator.estimate(record);
                kind_cost += cost;
                records.push(AssembledRecord {
                    tag_compliant: self.is_tag_compliant(record),
                    required_tags: self.required_tags_display(record),
                    estimated_monthly_cost: cost,
                    record: record.clone(),
                });
            }

            if outcome.is_success() {
                succeeded_kinds.push(kind);
            } else {
                failed_kinds.push(kind);
            }

            kinds.push(KindSummary {
                kind,
                success: outcome.is_success(),
                record_count: outcome.records().len(),
                source: outcome.source,
                attempts: outcome.attempts,
                duration_ms: outcome.duration_ms,
                estimated_monthly_cost: kind_cost,
                error: outcome.error().cloned(),
            });
        }

        let total_estimated_monthly_cost: f64 = kinds.iter().map(|k| k.estimated_monthly_cost).sum();

        CollectionResult {
            success: !succeeded_kinds.is_empty(),
            identity: request.identity().to_string(),
            region: request.region().to_string(),
            requested_kinds: request.kinds().to_vec(),
            success_count: succeeded_kinds.len(),
            total_count: request.kinds().len(),
            succeeded_kinds,
            failed_kinds,
            kinds,
            records,
            total_estimated_monthly_cost,
            completed_at,
        }
    }
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new(
            vec![crate::config::DEFAULT_REQUIRED_TAG.to_string()],
            Arc::new(FlatRateEstimator::default()),
        )
    }
}
