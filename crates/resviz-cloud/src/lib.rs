//! resviz collection core
//!
//! Collects cloud resource inventories in batch runs. Results are cached on
//! disk per identity, region and kind, and a run lock keeps two runs for the
//! same identity/region from overlapping.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   resviz CLI                     │
//! │             (resviz collect/status)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 resviz-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │              Collector                    │   │
//! │  │  lock → cache / fetch → assemble          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌─────────┐  │
//! │  │  CacheStore  │ │ RunLockReg.  │ │ Reports │  │
//! │  └──────────────┘ └──────────────┘ └─────────┘  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │     trait ResourceFetcher { ... }         │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!          ┌────────▼────────┐
//!          │ resviz-cloud-aws │
//!          │ EC2 RDS S3 λ     │
//!          └─────────────────┘
//! ```

pub mod assembler;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
mod fsutil;
pub mod lock;
pub mod model;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod status;

// Re-exports
pub use assembler::{
    AssembledRecord, CollectionResult, CostEstimator, FlatRateEstimator, KindSummary,
    ResultAssembler,
};
pub use cache::{CacheEntry, CacheInfo, CacheSize, CacheStatus, CacheStore, CacheSummary};
pub use config::{CollectorConfig, RetryConfig};
pub use error::{CloudError, FetchError, Result};
pub use fetcher::{FetchScope, FetcherRegistry, RecordStream, ResourceFetcher};
pub use filter::{PageInfo, TagFilter, filtered_counts, paginate, tag_values};
pub use lock::{
    Acquisition, ProcessProbe, RunLock, RunLockRecord, RunLockRegistry, RunStatus,
    SystemProcessProbe,
};
pub use model::{
    CollectionRequest, DEFAULT_IDENTITY, ResourceKind, ResourceRecord, identity_for_profile,
};
pub use orchestrator::Collector;
pub use outcome::{KindOutcome, OutcomeSource};
pub use report::{ReportStore, RunSummary};
pub use status::{ExecutionInfo, execution_info};
