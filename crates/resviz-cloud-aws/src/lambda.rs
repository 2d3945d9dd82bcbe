//! Lambda functions

use crate::context::AwsContext;
use crate::convert::arn_resource_name;
use crate::error::{classify_sdk_error, is_fatal_for_enrichment};
use crate::paginate::paginate;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::types::FunctionConfiguration;
use resviz_cloud::{
    FetchError, FetchScope, RecordStream, ResourceFetcher, ResourceKind, ResourceRecord,
};
use serde_json::json;
use std::collections::BTreeMap;

/// ListFunctions accepts 1..=50 items per page
const PAGE_SIZE_RANGE: (i32, i32) = (1, 50);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct LambdaFetcher {
    client: Client,
}

impl LambdaFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.lambda_client())
    }

    async fn function_tags(&self, arn: &str) -> Result<BTreeMap<String, String>, FetchError> {
        match self.client.list_tags().resource(arn).send().await {
            Ok(output) => Ok(output
                .tags()
                .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()),
            Err(e) => {
                let err = classify_sdk_error(&e);
                if is_fatal_for_enrichment(&err) {
                    return Err(err);
                }
                tracing::debug!("Skipping tags for function {}: {}", arn, err);
                Ok(BTreeMap::new())
            }
        }
    }
}

impl ResourceFetcher for LambdaFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Lambda
    }

    fn fetch<'a>(&'a self, scope: &'a FetchScope) -> RecordStream<'a> {
        let page_size = scope.page_size.clamp(PAGE_SIZE_RANGE.0, PAGE_SIZE_RANGE.1);

        paginate(move |marker| async move {
            let output = self
                .client
                .list_functions()
                .max_items(page_size)
                .set_marker(marker)
                .send()
                .await
                .map_err(|e| classify_sdk_error(&e))?;

            let mut records = Vec::with_capacity(output.functions().len());
            for function in output.functions() {
                let Some(record) = function_record(function) else {
                    continue;
                };
                let tags = match function.function_arn() {
                    Some(arn) => self.function_tags(arn).await?,
                    None => BTreeMap::new(),
                };
                records.push(record.with_tags(tags));
            }
            tracing::debug!("Lambda page in {}: {} functions", scope.region, records.len());

            Ok::<_, FetchError>((records, output.next_marker().map(str::to_string)))
        })
    }
}

fn function_record(function: &FunctionConfiguration) -> Option<ResourceRecord> {
    let name = function.function_name()?;
    let code_size_mb = (function.code_size() as f64 / BYTES_PER_MB * 100.0).round() / 100.0;

    Some(
        ResourceRecord::new(ResourceKind::Lambda, name)
            .with_attribute("runtime", json!(function.runtime().map(|r| r.as_str())))
            .with_attribute("handler", json!(function.handler()))
            .with_attribute("code_size_mb", json!(code_size_mb))
            .with_attribute("memory_mb", json!(function.memory_size()))
            .with_attribute("timeout_secs", json!(function.timeout()))
            .with_attribute("last_modified", json!(function.last_modified()))
            .with_attribute("state", json!(function.state().map(|s| s.as_str())))
            .with_attribute("role", json!(function.role().map(arn_resource_name))),
    )
}
