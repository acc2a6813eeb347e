//! AWS error classification
//!
//! Typed categories for AWS SDK errors using the `.code()` method instead of
//! string matching on Debug format. Delete requests treat "not found" as
//! success so removal stays idempotent.

use aws_sdk_ec2::error::ProvideErrorMetadata;
use thiserror::Error;

/// AWS error categories relevant to deletion.
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (already gone; removal counts as done)
    #[error("resource not found")]
    NotFound,

    /// Rate limit exceeded; the next sweep retries
    #[error("rate limit exceeded")]
    Throttled,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound)
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidPermission.NotFound",
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchEntity",
    "NoSuchTagSet",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound,
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Check whether an SDK error means the resource is already gone.
pub fn is_not_found<E: ProvideErrorMetadata>(err: &E) -> bool {
    classify_aws_error(err.code(), err.message()).is_not_found()
}
