// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Classification of provider error messages into well-known error codes

use crate::types::LastError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

pub const ERR_INFRA_UNAUTHENTICATED: &str = "ERR_INFRA_UNAUTHENTICATED";
pub const ERR_INFRA_UNAUTHORIZED: &str = "ERR_INFRA_UNAUTHORIZED";
pub const ERR_INFRA_QUOTA_EXCEEDED: &str = "ERR_INFRA_QUOTA_EXCEEDED";
pub const ERR_INFRA_RATE_LIMITS_EXCEEDED: &str = "ERR_INFRA_RATE_LIMITS_EXCEEDED";
pub const ERR_INFRA_DEPENDENCIES: &str = "ERR_INFRA_DEPENDENCIES";
pub const ERR_RETRYABLE_INFRA_DEPENDENCIES: &str = "ERR_RETRYABLE_INFRA_DEPENDENCIES";
pub const ERR_INFRA_RESOURCES_DEPLETED: &str = "ERR_INFRA_RESOURCES_DEPLETED";
pub const ERR_CONFIGURATION_PROBLEM: &str = "ERR_CONFIGURATION_PROBLEM";
pub const ERR_RETRYABLE_CONFIGURATION_PROBLEM: &str = "ERR_RETRYABLE_CONFIGURATION_PROBLEM";

const PATTERNS: &[(&str, &str)] = &[
    (
        ERR_INFRA_UNAUTHENTICATED,
        r"(?i)(InvalidAuthenticationTokenTenant|Authentication failed|AuthFailure|invalid character|invalid_client|query returned no results|InvalidAccessKeyId|cannot fetch token|InvalidSecretAccessKey|InvalidSubscriptionId)",
    ),
    (
        ERR_INFRA_UNAUTHORIZED,
        r"(?i)(Unauthorized|InvalidClientTokenId|SignatureDoesNotMatch|AuthorizationFailed|invalid_grant|Authorization Profile was not found|no active subscriptions|not authorized|AccessDenied|OperationNotAllowed|Error 403|SERVICE_ACCOUNT_ACCESS_DENIED)",
    ),
    (
        ERR_INFRA_QUOTA_EXCEEDED,
        r"(?i)((?:^|[^t]|(?:[^s]|^)t|(?:[^e]|^)st|(?:[^u]|^)est|(?:[^q]|^)uest|(?:[^e]|^)quest|(?:[^r]|^)equest)LimitExceeded|Quotas|Quota.*exceeded|exceeded quota|Quota has been met|QUOTA_EXCEEDED)",
    ),
    (
        ERR_INFRA_RATE_LIMITS_EXCEEDED,
        r"(?i)(RequestLimitExceeded|Throttling|Too many requests)",
    ),
    (
        ERR_INFRA_DEPENDENCIES,
        r"(?i)(PendingVerification|Access Not Configured|accessNotConfigured|DependencyViolation|OptInRequired|DeleteConflict|Conflict|inactive billing state|ReadOnlyDisabledSubscription|is already being used|InUseSubnetCannotBeDeleted|VnetInUse|InUseRouteTableCannotBeDeleted|timeout while waiting for state to become|InvalidCidrBlock|already busy for|InsufficientFreeAddressesInSubnet|InternalServerError|RetryableError|internalerror|internal server error|A resource with the ID|VnetAddressSpaceCannotChangeDueToPeerings)",
    ),
    (ERR_RETRYABLE_INFRA_DEPENDENCIES, r"(?i)(RetryableError)"),
    (
        ERR_INFRA_RESOURCES_DEPLETED,
        r"(?i)(not available in the current hardware cluster|InsufficientInstanceCapacity|SkuNotAvailable|ZonalAllocationFailed|out of stock)",
    ),
    (
        ERR_CONFIGURATION_PROBLEM,
        r"(?i)(AzureBastionSubnet|not supported in your requested Availability Zone|InvalidParameter|InvalidParameterValue|InvalidParameterCombination|InvalidVpcID|InvalidSubnetID|NoSuchBucket|Invalid value|notFound|no such host|violates constraint|NetcfgInvalidSubnet|InvalidBucketName)",
    ),
    (
        ERR_RETRYABLE_CONFIGURATION_PROBLEM,
        r"(?i)(is misconfigured and requires zero voluntary evictions|SDK\.CanNotResolveEndpoint|The requested configuration is currently not supported)",
    ),
];

static MATCHERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(code, pattern)| Regex::new(pattern).ok().map(|re| (*code, re)))
        .collect()
});

/// Error codes whose pattern matches `text`, in declaration order.
pub fn determine_error_codes(text: &str) -> Vec<String> {
    MATCHERS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(code, _)| code.to_string())
        .collect()
}

/// Builds a `LastError` for `description`: the codes reported by the
/// extension first, then codes detected in the text, without duplicates.
pub fn last_error_from(description: &str, reported: &[String], now: DateTime<Utc>) -> LastError {
    let mut codes: Vec<String> = Vec::new();
    for code in reported
        .iter()
        .cloned()
        .chain(determine_error_codes(description))
    {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    LastError {
        description: description.to_string(),
        task_id: None,
        codes,
        last_update_time: Some(now),
    }
}
