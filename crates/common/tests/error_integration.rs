//! Integration tests for `partsource_common::error`.

use std::time::Duration;

use partsource_common::error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
use thiserror::Error;

#[derive(Debug, Error)]
enum CatalogError {
    #[error("catalog entry '{0}' withdrawn")]
    Withdrawn(String),
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ErrorClassification for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Withdrawn(_) => false,
            Self::Common(err) => err.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Withdrawn(_) => ErrorSeverity::Info,
            Self::Common(err) => err.severity(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Withdrawn(_) => None,
            Self::Common(err) => err.retry_after(),
        }
    }
}

fn load(part: &str) -> Result<u32, CatalogError> {
    if part.is_empty() {
        return Err(CommonError::validation("part_number", "must not be empty").into());
    }
    if part == "OLD-1" {
        return Err(CatalogError::Withdrawn(part.to_string()));
    }
    let parsed: CommonResult<u32> = serde_json::from_str(part).map_err(CommonError::from);
    Ok(parsed?)
}

#[test]
fn classification_matrix_matches_expected_contract() {
    let cases = vec![
        (CommonError::config("missing vendor list"), false, ErrorSeverity::Error),
        (CommonError::rate_limit(None), true, ErrorSeverity::Warning),
        (CommonError::timeout("quote", Duration::from_secs(5)), true, ErrorSeverity::Warning),
        (CommonError::backend("napa", "503", true), true, ErrorSeverity::Error),
        (CommonError::not_found_with_id("PurchaseOrder", "PO-1"), false, ErrorSeverity::Info),
        (CommonError::internal("sequence overflow"), false, ErrorSeverity::Critical),
    ];

    for (err, retryable, severity) in cases {
        assert_eq!(err.is_retryable(), retryable, "{err}");
        assert_eq!(err.severity(), severity, "{err}");
    }
}

#[test]
fn module_errors_delegate_to_common_classification() {
    let err = load("").unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.severity(), ErrorSeverity::Error);

    let withdrawn = load("OLD-1").unwrap_err();
    assert_eq!(withdrawn.severity(), ErrorSeverity::Info);
    assert_eq!(withdrawn.to_string(), "catalog entry 'OLD-1' withdrawn");

    let parse = load("abc").unwrap_err();
    assert!(matches!(parse, CatalogError::Common(CommonError::Serialization { .. })));

    assert_eq!(load("42").unwrap(), 42);
}

#[test]
fn severity_orders_from_info_to_critical() {
    assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
    assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
    assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
}
