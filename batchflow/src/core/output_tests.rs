//! Tests for `StageOutput`.

use super::{StageOutput, StageStatus, ERROR_DETAIL_KEY};
use crate::errors::{BatchflowError, ExtractError};
use std::collections::HashMap;

#[test]
fn test_ok_output() {
    let mut data = HashMap::new();
    data.insert("rows".to_string(), serde_json::json!(3));

    let output = StageOutput::ok(data);
    assert_eq!(output.status, StageStatus::Ok);
    assert!(output.is_success());
    assert!(!output.is_failure());
}

#[test]
fn test_ok_empty() {
    let output = StageOutput::ok_empty();
    assert_eq!(output.status, StageStatus::Ok);
    assert!(output.data.is_none());
}

#[test]
fn test_ok_serialized_and_get_as() {
    let output = StageOutput::ok_serialized("months", &vec![3_i64, 5]);
    let months: Vec<i64> = output.get_as("months").unwrap().unwrap();
    assert_eq!(months, vec![3, 5]);

    let missing: Option<Vec<i64>> = output.get_as("other").unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_get_as_wrong_shape_is_error() {
    let output = StageOutput::ok_value("months", serde_json::json!("not a list"));
    let result: Result<Option<Vec<i64>>, _> = output.get_as("months");
    assert!(result.is_err());
}

#[test]
fn test_fail_output() {
    let output = StageOutput::fail("source unavailable").with_error_kind("extract");
    assert_eq!(output.status, StageStatus::Fail);
    assert_eq!(output.error.as_deref(), Some("source unavailable"));
    assert_eq!(output.error_kind.as_deref(), Some("extract"));
    assert!(output.is_failure());
}

#[test]
fn test_with_data_merges() {
    let mut extra = HashMap::new();
    extra.insert("b".to_string(), serde_json::json!(2));

    let output = StageOutput::ok_value("a", serde_json::json!(1)).with_data(extra);
    assert_eq!(output.get("a"), Some(&serde_json::json!(1)));
    assert_eq!(output.get("b"), Some(&serde_json::json!(2)));
}

#[test]
fn test_metadata_and_serde() {
    let output = StageOutput::ok_empty().add_metadata("partitions", serde_json::json!(4));
    let json = serde_json::to_value(&output).unwrap();

    assert_eq!(json["status"], "ok");
    assert_eq!(json["metadata"]["partitions"], 4);
    assert!(json.get("error").is_none());
}

#[test]
fn test_from_error_keeps_detail() {
    let err = BatchflowError::from(ExtractError::TableNotFound("p:d.t".to_string()));
    let output = StageOutput::from_error(&err);

    assert!(output.is_failure());
    assert_eq!(output.error_kind.as_deref(), Some("extract"));
    assert_eq!(
        output.metadata[ERROR_DETAIL_KEY],
        serde_json::json!({"error": "table_not_found", "detail": "p:d.t"})
    );

    let output = StageOutput::from_error(&BatchflowError::Internal("join".to_string()));
    assert!(!output.metadata.contains_key(ERROR_DETAIL_KEY));
}
