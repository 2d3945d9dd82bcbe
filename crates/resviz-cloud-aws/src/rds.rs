//! RDS database instances
//!
//! DescribeDBInstances returns tags inline, so no per-instance lookups.

use crate::context::AwsContext;
use crate::convert::{collect_tags, to_utc};
use crate::error::classify_sdk_error;
use crate::paginate::paginate;
use aws_sdk_rds::Client;
use aws_sdk_rds::types::DbInstance;
use resviz_cloud::{
    FetchError, FetchScope, RecordStream, ResourceFetcher, ResourceKind, ResourceRecord,
};
use serde_json::json;

/// DescribeDBInstances accepts 20..=100 records per page
const PAGE_SIZE_RANGE: (i32, i32) = (20, 100);

pub struct RdsFetcher {
    client: Client,
}

impl RdsFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.rds_client())
    }
}

impl ResourceFetcher for RdsFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Rds
    }

    fn fetch<'a>(&'a self, scope: &'a FetchScope) -> RecordStream<'a> {
        let page_size = scope.page_size.clamp(PAGE_SIZE_RANGE.0, PAGE_SIZE_RANGE.1);

        paginate(move |marker| async move {
            let output = self
                .client
                .describe_db_instances()
                .max_records(page_size)
                .set_marker(marker)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;

            let records: Vec<_> = output.db_instances().iter().filter_map(db_record).collect();
            tracing::debug!("RDS page in {}: {} instances", scope.region, records.len());

            Ok::<_, FetchError>((records, output.marker().map(str::to_string)))
        })
    }
}

fn db_record(db: &DbInstance) -> Option<ResourceRecord> {
    let id = db.db_instance_identifier()?;
    let tags = collect_tags(db.tag_list(), |t| t.key(), |t| t.value());

    let engine = match (db.engine(), db.engine_version()) {
        (Some(engine), Some(version)) => Some(format!("{} {}", engine, version)),
        (Some(engine), None) => Some(engine.to_string()),
        _ => None,
    };

    let mut record = ResourceRecord::new(ResourceKind::Rds, id)
        .with_attribute("engine", json!(engine))
        .with_attribute("instance_class", json!(db.db_instance_class()))
        .with_attribute("status", json!(db.db_instance_status()))
        .with_attribute("availability_zone", json!(db.availability_zone()))
        .with_attribute("multi_az", json!(db.multi_az().unwrap_or(false)))
        .with_attribute("storage_type", json!(db.storage_type()))
        .with_attribute("allocated_storage_gb", json!(db.allocated_storage()))
        .with_tags(tags);

    if let Some(created) = db.instance_create_time().and_then(to_utc) {
        record = record.with_created_at(created);
    }
    Some(record)
}
