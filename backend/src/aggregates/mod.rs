//! Summary statistics over a parsed document.
//!
//! All three computations are pure and never fail: a missing top-level list
//! and an empty one produce the same zeroed statistics.
//!
//! Release dates are compared as strings. Well-formed ISO-8601 timestamps
//! order correctly that way; anything else orders lexically.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::models::Shape;

/// Statistics for an OCDS release package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasesAggregate {
    pub count: usize,
    pub unique_ocids: BTreeSet<String>,
    pub earliest_release_date: Option<String>,
    pub latest_release_date: Option<String>,
}

/// Statistics for an OCDS record package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsAggregate {
    pub count: usize,
    pub unique_ocids: BTreeSet<String>,
}

/// Statistics for 360Giving grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantsAggregate {
    pub count: usize,
    pub unique_ids: BTreeSet<String>,
    /// Ids seen more than once, in the order they first appeared.
    pub duplicate_ids: Vec<String>,
    /// Grants without an `id` key.
    pub missing_ids: usize,
}

/// Statistics for whichever shape was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Aggregates {
    Releases(ReleasesAggregate),
    Records(RecordsAggregate),
    Grants(GrantsAggregate),
}

/// Compute the statistics for `shape`.
pub fn aggregate(document: &Value, shape: Shape) -> Aggregates {
    match shape {
        Shape::Releases => Aggregates::Releases(releases_aggregate(document)),
        Shape::Records => Aggregates::Records(records_aggregate(document)),
        Shape::Grants => Aggregates::Grants(grants_aggregate(document)),
    }
}

fn list<'a>(document: &'a Value, key: &str) -> &'a [Value] {
    document
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn releases_aggregate(document: &Value) -> ReleasesAggregate {
    let releases = list(document, "releases");

    let unique_ocids = releases
        .iter()
        .filter_map(|r| r.get("ocid"))
        .map(text)
        .collect();

    let dates: Vec<String> = releases.iter().filter_map(|r| r.get("date")).map(text).collect();

    ReleasesAggregate {
        count: releases.len(),
        unique_ocids,
        earliest_release_date: dates.iter().min().cloned(),
        latest_release_date: dates.iter().max().cloned(),
    }
}

pub fn records_aggregate(document: &Value) -> RecordsAggregate {
    let records = list(document, "records");
    RecordsAggregate {
        count: records.len(),
        unique_ocids: records
            .iter()
            .filter_map(|r| r.get("ocid"))
            .map(text)
            .collect(),
    }
}

pub fn grants_aggregate(document: &Value) -> GrantsAggregate {
    let grants = list(document, "grants");

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    let mut missing_ids = 0;

    for grant in grants {
        match grant.get("id") {
            Some(id) => {
                let id = text(id);
                let count = counts.entry(id.clone()).or_insert(0);
                if *count == 0 {
                    first_seen.push(id);
                }
                *count += 1;
            }
            None => missing_ids += 1,
        }
    }

    let duplicate_ids = first_seen
        .iter()
        .filter(|id| counts.get(*id).is_some_and(|&n| n > 1))
        .cloned()
        .collect();

    GrantsAggregate {
        count: grants.len(),
        unique_ids: first_seen.into_iter().collect(),
        duplicate_ids,
        missing_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_releases() {
        let stats = releases_aggregate(&json!({}));
        assert_eq!(stats, ReleasesAggregate::default());
        assert_eq!(stats.count, 0);
        assert!(stats.unique_ocids.is_empty());
        assert_eq!(stats.earliest_release_date, None);
    }

    #[test]
    fn test_empty_releases_match_missing_releases() {
        assert_eq!(releases_aggregate(&json!({ "releases": [] })), releases_aggregate(&json!({})));
    }

    #[test]
    fn test_releases_without_fields_still_count() {
        let stats = releases_aggregate(&json!({ "releases": [{}, {}, {}] }));
        assert_eq!(stats.count, 3);
        assert!(stats.unique_ocids.is_empty());
        assert_eq!(stats.latest_release_date, None);
    }

    #[test]
    fn test_duplicate_ocids_collapse() {
        let stats = releases_aggregate(&json!({ "releases": [
            { "ocid": "ocds-1" }, { "ocid": "ocds-2" }, { "ocid": "ocds-1" }
        ]}));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.unique_ocids, BTreeSet::from(["ocds-1".to_string(), "ocds-2".to_string()]));
    }

    #[test]
    fn test_release_date_extremes_are_lexical() {
        let stats = releases_aggregate(&json!({ "releases": [
            { "date": "2015-06-01T00:00:00Z" },
            { "date": "2014-01-01T00:00:00Z" },
            {},
            { "date": "2016-12-31T00:00:00Z" }
        ]}));
        assert_eq!(stats.earliest_release_date.as_deref(), Some("2014-01-01T00:00:00Z"));
        assert_eq!(stats.latest_release_date.as_deref(), Some("2016-12-31T00:00:00Z"));
    }

    #[test]
    fn test_records() {
        let stats = records_aggregate(&json!({ "records": [{ "ocid": "a" }, { "ocid": "a" }, {}] }));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.unique_ocids.len(), 1);
        assert_eq!(records_aggregate(&json!({})), RecordsAggregate::default());
    }

    #[test]
    fn test_grants_duplicates_and_missing() {
        let stats = grants_aggregate(&json!({ "grants": [{ "id": "1" }, { "id": "1" }, {}] }));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.duplicate_ids, vec!["1".to_string()]);
        assert_eq!(stats.missing_ids, 1);
        assert_eq!(stats.unique_ids, BTreeSet::from(["1".to_string()]));
    }

    #[test]
    fn test_grant_duplicates_in_first_seen_order() {
        let stats = grants_aggregate(&json!({ "grants": [
            { "id": "b" }, { "id": "a" }, { "id": "c" }, { "id": "a" }, { "id": "b" }, { "id": "b" }
        ]}));
        assert_eq!(stats.duplicate_ids, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(stats.unique_ids.len(), 3);
    }

    #[test]
    fn test_aggregates_serialize_camel_case() {
        let value = serde_json::to_value(aggregate(&json!({ "grants": [{ "id": "1" }] }), Shape::Grants)).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["uniqueIds"], json!(["1"]));
        assert_eq!(value["missingIds"], 0);
    }
}
