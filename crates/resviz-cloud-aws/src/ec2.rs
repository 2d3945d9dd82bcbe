//! EC2 instances

use crate::context::AwsContext;
use crate::convert::{collect_tags, display_name, to_utc};
use crate::error::classify_sdk_error;
use crate::paginate::paginate;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, Instance};
use resviz_cloud::{
    FetchError, FetchScope, RecordStream, ResourceFetcher, ResourceKind, ResourceRecord,
};
use serde_json::json;

/// DescribeInstances accepts 5..=1000 results per page
const PAGE_SIZE_RANGE: (i32, i32) = (5, 1000);

/// Every state except `terminated`
const LIVE_STATES: &[&str] = &["pending", "running", "shutting-down", "stopping", "stopped"];

pub struct Ec2Fetcher {
    client: Client,
}

impl Ec2Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.ec2_client())
    }
}

impl ResourceFetcher for Ec2Fetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Ec2
    }

    fn fetch<'a>(&'a self, scope: &'a FetchScope) -> RecordStream<'a> {
        let page_size = scope.page_size.clamp(PAGE_SIZE_RANGE.0, PAGE_SIZE_RANGE.1);

        paginate(move |token| async move {
            let output = self
                .client
                .describe_instances()
                .filters(live_state_filter())
                .max_results(page_size)
                .set_next_token(token)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;

            let records: Vec<_> = output
                .reservations()
                .iter()
                .flat_map(|r| r.instances())
                .filter_map(instance_record)
                .collect();
            tracing::debug!("EC2 page in {}: {} instances", scope.region, records.len());

            Ok::<_, FetchError>((records, output.next_token().map(str::to_string)))
        })
    }
}

fn live_state_filter() -> Filter {
    LIVE_STATES
        .iter()
        .fold(Filter::builder().name("instance-state-name"), |f, state| {
            f.values(*state)
        })
        .build()
}

fn instance_record(instance: &Instance) -> Option<ResourceRecord> {
    let id = instance.instance_id()?;
    let tags = collect_tags(instance.tags(), |t| t.key(), |t| t.value());

    let mut record = ResourceRecord::new(ResourceKind::Ec2, id)
        .with_name(display_name(id, &tags))
        .with_attribute(
            "state",
            json!(instance.state().and_then(|s| s.name()).map(|n| n.as_str())),
        )
        .with_attribute(
            "instance_type",
            json!(instance.instance_type().map(|t| t.as_str())),
        )
        .with_attribute(
            "availability_zone",
            json!(instance.placement().and_then(|p| p.availability_zone())),
        )
        .with_attribute("public_ip", json!(instance.public_ip_address()))
        .with_attribute("private_ip", json!(instance.private_ip_address()))
        .with_tags(tags);

    if let Some(launched) = instance.launch_time().and_then(to_utc) {
        record = record.with_created_at(launched);
    }
    Some(record)
}
