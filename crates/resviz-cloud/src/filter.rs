//! Tag filtering and pagination over assembled records

use crate::assembler::{AssembledRecord, CollectionResult};
use crate::error::{CloudError, Result};
use crate::model::{ResourceKind, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Exact-match filter over tags; every pair must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pairs: BTreeMap<String, String>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn matches(&self, record: &ResourceRecord) -> bool {
        self.pairs
            .iter()
            .all(|(key, value)| record.tag(key) == Some(value.as_str()))
    }

    pub fn apply<'a>(&self, records: &'a [AssembledRecord]) -> Vec<&'a AssembledRecord> {
        records.iter().filter(|r| self.matches(&r.record)).collect()
    }
}

impl FromStr for TagFilter {
    type Err = CloudError;

    /// Parse `Key=Value[,Key=Value...]`
    fn from_str(s: &str) -> Result<Self> {
        let mut filter = TagFilter::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                CloudError::InvalidRequest(format!("Tag filter must be Key=Value: {}", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CloudError::InvalidRequest(format!(
                    "Tag filter has an empty key: {}",
                    pair
                )));
            }
            filter = filter.with(key, value.trim());
        }
        Ok(filter)
    }
}

/// Distinct non-empty values of a tag across records
pub fn tag_values(records: &[AssembledRecord], key: &str) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|r| r.record.tag(key))
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Matching record count per requested kind, zero included
pub fn filtered_counts(result: &CollectionResult, filter: &TagFilter) -> BTreeMap<ResourceKind, usize> {
    let mut counts: BTreeMap<ResourceKind, usize> =
        result.requested_kinds.iter().map(|&k| (k, 0)).collect();
    for record in filter.apply(&result.records) {
        *counts.entry(record.record.kind).or_default() += 1;
    }
    counts
}

/// Position of one page within a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total_items: usize,
    pub total_pages: usize,

    /// 1-based, clamped into range
    pub current_page: usize,
    pub page_size: usize,

    /// 0-based, end exclusive
    pub start_index: usize,
    pub end_index: usize,
}

impl PageInfo {
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }
}

/// Slice out one page; out-of-range pages are clamped
pub fn paginate<T>(items: &[T], page_size: usize, page: usize) -> (&[T], PageInfo) {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let current_page = page.clamp(1, total_pages.max(1));
    let start_index = ((current_page - 1) * page_size).min(total_items);
    let end_index = (start_index + page_size).min(total_items);

    (
        &items[start_index..end_index],
        PageInfo {
            total_items,
            total_pages,
            current_page,
            page_size,
            start_index,
            end_index,
        },
    )
}
