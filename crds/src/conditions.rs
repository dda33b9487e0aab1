// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

// Well-known values reported in OLM resource statuses.

/// `CatalogSource.status.connectionState.lastObservedState` once the registry
/// pod serves requests.
pub const READY: &str = "READY";

pub const AT_LATEST_KNOWN: &str = "AtLatestKnown";
pub const UPGRADE_PENDING: &str = "UpgradePending";
pub const RESOLUTION_FAILED: &str = "ResolutionFailed";

pub const APPROVAL_AUTOMATIC: &str = "Automatic";
pub const APPROVAL_MANUAL: &str = "Manual";

pub const INSTALL_PLAN_COMPLETE: &str = "Complete";
pub const INSTALL_PLAN_FAILED: &str = "Failed";

pub const CSV_SUCCEEDED: &str = "Succeeded";
pub const CSV_FAILED: &str = "Failed";

pub const NAMESPACE_ACTIVE: &str = "Active";

/// Catalog registry pods are not relabelled in this namespace.
pub const MARKETPLACE_NAMESPACE: &str = "openshift-marketplace";

pub const RESTRICTED_SECURITY_CONTEXT: &str = "restricted";

pub const DEFAULT_CATALOG_POLL_INTERVAL: &str = "10m0s";
