//! AWS resource fetchers for resviz
//!
//! This crate implements the `ResourceFetcher` trait for EC2, RDS, S3 and
//! Lambda using the AWS SDK for Rust.
//!
//! # Requirements
//!
//! - AWS credentials resolvable by the default provider chain
//!   (environment, shared config profile, or instance/task role)
//!
//! # Example
//!
//! ```ignore
//! use resviz_cloud::{CollectionRequest, Collector, ResourceKind};
//! use resviz_cloud_aws::{AwsContext, aws_fetchers};
//!
//! let ctx = AwsContext::load("ap-northeast-1", Some("sandbox")).await;
//! let collector = Collector::new(config, cache, locks, aws_fetchers(&ctx));
//!
//! let request = CollectionRequest::new("sandbox", "ap-northeast-1", ResourceKind::ALL.to_vec())?;
//! let result = collector.collect(request).await?;
//! ```

pub mod context;
mod convert;
pub mod ec2;
pub mod error;
pub mod lambda;
mod paginate;
pub mod rds;
pub mod s3;

pub use context::AwsContext;
pub use ec2::Ec2Fetcher;
pub use error::classify_code;
pub use lambda::LambdaFetcher;
pub use rds::RdsFetcher;
pub use s3::S3Fetcher;

use resviz_cloud::FetcherRegistry;
use std::sync::Arc;

/// Registry with a fetcher for every supported kind
pub fn aws_fetchers(ctx: &AwsContext) -> FetcherRegistry {
    FetcherRegistry::new()
        .with(Arc::new(Ec2Fetcher::from_context(ctx)))
        .with(Arc::new(RdsFetcher::from_context(ctx)))
        .with(Arc::new(S3Fetcher::from_context(ctx)))
        .with(Arc::new(LambdaFetcher::from_context(ctx)))
}
