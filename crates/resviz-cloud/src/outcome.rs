//! Per-kind outcomes of a collection run

use crate::error::FetchError;
use crate::model::{ResourceKind, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a kind's records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    Cache,
    Provider,
}

impl fmt::Display for OutcomeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeSource::Cache => write!(f, "cache"),
            OutcomeSource::Provider => write!(f, "provider"),
        }
    }
}

/// Result of collecting one kind
#[derive(Debug, Clone, PartialEq)]
pub struct KindOutcome {
    pub kind: ResourceKind,
    pub result: Result<Vec<ResourceRecord>, FetchError>,
    pub source: OutcomeSource,

    /// Provider attempts made (0 for cache hits)
    pub attempts: u32,

    pub duration_ms: u64,
}

impl KindOutcome {
    pub fn cached(kind: ResourceKind, records: Vec<ResourceRecord>, duration_ms: u64) -> Self {
        Self {
            kind,
            result: Ok(records),
            source: OutcomeSource::Cache,
            attempts: 0,
            duration_ms,
        }
    }

    pub fn fetched(
        kind: ResourceKind,
        records: Vec<ResourceRecord>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            kind,
            result: Ok(records),
            source: OutcomeSource::Provider,
            attempts,
            duration_ms,
        }
    }

    pub fn failed(kind: ResourceKind, error: FetchError, attempts: u32, duration_ms: u64) -> Self {
        Self {
            kind,
            result: Err(error),
            source: OutcomeSource::Provider,
            attempts,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn records(&self) -> &[ResourceRecord] {
        self.result.as_deref().unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }
}
