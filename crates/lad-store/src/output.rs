//! JSON rendering of query results with materialized payloads.

use lad_common::{Record, Representation, Result, TimeField};
use serde_json::{json, Value};

use crate::query::{DeltaResult, LeafRecords, QueryResult};

/// One record with its payload converted to `repr`.
///
/// Fails with a conversion error when the payload has no form in `repr`.
pub fn render_record(record: &Record, repr: Representation, primary: TimeField) -> Result<Value> {
    let value = record.payload.materialize(repr)?.into_json();
    Ok(json!({
        "identifier": record.identifier,
        "kind": record.kind.as_str(),
        "time": record.primary_time(primary),
        "times": serde_json::to_value(&record.times)?,
        "value": value,
        "provenance": serde_json::to_value(&record.provenance)?,
    }))
}

fn render_leaves(leaves: &[LeafRecords], repr: Representation, primary: TimeField) -> Result<Value> {
    let mut out = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let records = leaf
            .records
            .iter()
            .map(|r| render_record(r, repr, primary))
            .collect::<Result<Vec<_>>>()?;
        out.push(json!({
            "path": leaf.path.to_string(),
            "records": records,
        }));
    }
    Ok(Value::Array(out))
}

pub fn render_query(result: &QueryResult, repr: Representation, primary: TimeField) -> Result<Value> {
    Ok(json!({
        "representation": repr.to_string(),
        "count": result.len(),
        "leaves": render_leaves(&result.leaves, repr, primary)?,
    }))
}

pub fn render_delta(result: &DeltaResult, repr: Representation, primary: TimeField) -> Result<Value> {
    Ok(json!({
        "client": result.client.as_str(),
        "scope": result.scope.to_string(),
        "first_call": result.first_call,
        "watermark": result.watermark,
        "last_seen_timestamp": result.last_seen_timestamp,
        "representation": repr.to_string(),
        "count": result.len(),
        "leaves": render_leaves(&result.leaves, repr, primary)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Queryable;
    use crate::predicate::SearchPredicate;
    use crate::query::QueryOptions;
    use crate::tree::ContainerTree;
    use chrono::{TimeZone, Utc};
    use lad_common::{DataKind, Payload, Provenance, SessionKey, TimeSet, TypedValue, VenueId};

    fn record(id: &str, payload: Payload) -> Record {
        Record::new(
            id,
            DataKind::Channel,
            TimeSet::at_ert(Utc.timestamp_opt(100, 0).unwrap()),
            payload,
            Provenance {
                host: "gds1".into(),
                venue: VenueId::from("test"),
                session: SessionKey::new(7, 0),
                realtime: true,
            },
        )
    }

    #[test]
    fn test_render_numeric() {
        let tree = ContainerTree::default();
        tree.insert(record("A-0001", Payload::Value(TypedValue::Int(42))))
            .unwrap();
        let result = tree.query(&SearchPredicate::All, &QueryOptions::latest());
        let out = render_query(&result, Representation::Numeric, TimeField::Ert).unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["leaves"][0]["path"], "gds1/7-0/channel/A-0001");
        assert_eq!(out["leaves"][0]["records"][0]["value"], 42.0);
    }

    #[test]
    fn test_render_conversion_failure() {
        let tree = ContainerTree::default();
        tree.insert(record("B-0002", Payload::Bytes(vec![0xff, 0xfe])))
            .unwrap();
        let result = tree.query(&SearchPredicate::All, &QueryOptions::latest());
        let err = render_query(&result, Representation::Numeric, TimeField::Ert).unwrap_err();
        assert_eq!(err.code(), 30);
        let raw = render_query(&result, Representation::Raw, TimeField::Ert).unwrap();
        assert_eq!(raw["leaves"][0]["records"][0]["value"], "//4=");
    }
}
