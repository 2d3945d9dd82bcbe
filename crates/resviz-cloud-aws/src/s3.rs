//! S3 buckets
//!
//! Bucket listings are account-wide. Each bucket is enriched with its region,
//! public access and tags through separate calls; a failed lookup only loses
//! that detail unless it is throttling or a network failure.

use crate::context::AwsContext;
use crate::convert::{collect_tags, to_utc};
use crate::error::{classify_sdk_error, is_fatal_for_enrichment};
use crate::paginate::paginate;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{Bucket, Grant};
use resviz_cloud::{
    FetchError, FetchScope, RecordStream, ResourceFetcher, ResourceKind, ResourceRecord,
};
use serde_json::json;
use std::collections::BTreeMap;

/// ListBuckets accepts 1..=10000 buckets per page
const PAGE_SIZE_RANGE: (i32, i32) = (1, 10_000);

/// Region reported for buckets with an empty location constraint
const LEGACY_REGION: &str = "us-east-1";
const UNKNOWN: &str = "Unknown";
const ALL_USERS_GROUP: &str = "AllUsers";

pub struct S3Fetcher {
    client: Client,
}

impl S3Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.s3_client())
    }

    async fn bucket_record(&self, bucket: &Bucket) -> Result<Option<ResourceRecord>, FetchError> {
        let Some(name) = bucket.name() else {
            return Ok(None);
        };

        let region = self.bucket_region(name).await?;
        let public_access = self.public_access(name).await?;
        let tags = self.bucket_tags(name).await?;

        let mut record = ResourceRecord::new(ResourceKind::S3, name)
            .with_attribute("bucket_region", json!(region))
            .with_attribute("public_access", json!(public_access))
            .with_tags(tags);
        if let Some(created) = bucket.creation_date().and_then(to_utc) {
            record = record.with_created_at(created);
        }
        Ok(Some(record))
    }

    async fn bucket_region(&self, name: &str) -> Result<String, FetchError> {
        match self.client.get_bucket_location().bucket(name).send().await {
            Ok(output) => Ok(location_region(
                output.location_constraint().map(|c| c.as_str()),
            )),
            Err(e) => {
                tolerate(name, "location", classify_sdk_error(&e))?;
                Ok(UNKNOWN.to_string())
            }
        }
    }

    async fn public_access(&self, name: &str) -> Result<&'static str, FetchError> {
        match self.client.get_bucket_acl().bucket(name).send().await {
            Ok(output) => Ok(public_access_from_grants(output.grants())),
            Err(e) => {
                tolerate(name, "ACL", classify_sdk_error(&e))?;
                Ok(UNKNOWN)
            }
        }
    }

    async fn bucket_tags(&self, name: &str) -> Result<BTreeMap<String, String>, FetchError> {
        match self.client.get_bucket_tagging().bucket(name).send().await {
            Ok(output) => Ok(collect_tags(
                output.tag_set(),
                |t| Some(t.key()),
                |t| Some(t.value()),
            )),
            Err(e) => {
                // NoSuchTagSet lands here too
                tolerate(name, "tags", classify_sdk_error(&e))?;
                Ok(BTreeMap::new())
            }
        }
    }
}

impl ResourceFetcher for S3Fetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::S3
    }

    fn fetch<'a>(&'a self, scope: &'a FetchScope) -> RecordStream<'a> {
        let page_size = scope.page_size.clamp(PAGE_SIZE_RANGE.0, PAGE_SIZE_RANGE.1);

        paginate(move |token| async move {
            let output = self
                .client
                .list_buckets()
                .max_buckets(page_size)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;

            let mut records = Vec::with_capacity(output.buckets().len());
            for bucket in output.buckets() {
                if let Some(record) = self.bucket_record(bucket).await? {
                    records.push(record);
                }
            }
            tracing::debug!("S3 page: {} buckets", records.len());

            Ok::<_, FetchError>((records, output.continuation_token().map(str::to_string)))
        })
    }
}

/// Swallow a non-fatal enrichment failure
fn tolerate(bucket: &str, what: &str, err: FetchError) -> Result<(), FetchError> {
    if is_fatal_for_enrichment(&err) {
        return Err(err);
    }
    tracing::debug!("Skipping {} for bucket {}: {}", what, bucket, err);
    Ok(())
}

fn location_region(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => LEGACY_REGION.to_string(),
    }
}

fn public_access_from_grants(grants: &[Grant]) -> &'static str {
    let public = grants.iter().any(|grant| {
        grant
            .grantee()
            .and_then(|g| g.uri())
            .is_some_and(|uri| uri.contains(ALL_USERS_GROUP))
    });
    if public { "Public" } else { "Private" }
}
