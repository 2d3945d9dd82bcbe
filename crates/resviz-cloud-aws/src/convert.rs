//! Helpers for turning SDK shapes into records

use aws_sdk_ec2::primitives::DateTime as AwsDateTime;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub(crate) const NAME_TAG: &str = "Name";

/// Collect tags from any SDK tag shape, skipping entries without a key
pub(crate) fn collect_tags<T>(
    tags: &[T],
    key_fn: impl Fn(&T) -> Option<&str>,
    value_fn: impl Fn(&T) -> Option<&str>,
) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|t| {
            let key = key_fn(t)?;
            Some((key.to_string(), value_fn(t).unwrap_or_default().to_string()))
        })
        .collect()
}

/// The `Name` tag when present and non-empty, otherwise the id
pub(crate) fn display_name(id: &str, tags: &BTreeMap<String, String>) -> String {
    tags.get(NAME_TAG)
        .filter(|name| !name.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| id.to_string())
}

pub(crate) fn to_utc(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// Last path segment of an ARN such as `arn:aws:iam::1:role/service/app`
pub(crate) fn arn_resource_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let mut tags = BTreeMap::new();
        assert_eq!(display_name("i-1", &tags), "i-1");
        tags.insert("Name".to_string(), " ".to_string());
        assert_eq!(display_name("i-1", &tags), "i-1");
        tags.insert("Name".to_string(), "web".to_string());
        assert_eq!(display_name("i-1", &tags), "web");
    }

    #[test]
    fn test_to_utc() {
        let dt = AwsDateTime::from_secs(1_700_000_000);
        assert_eq!(to_utc(&dt).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_arn_resource_name() {
        assert_eq!(
            arn_resource_name("arn:aws:iam::123456789012:role/service-role/app-exec"),
            "app-exec"
        );
        assert_eq!(arn_resource_name("plain"), "plain");
    }
}
