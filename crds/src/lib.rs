// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

//! Read-side views of the Operator Lifecycle Manager resources.
//!
//! The CRDs themselves belong to the control plane under test, so schema
//! generation is disabled: these types only exist to deserialise what
//! `get -o json` returns.

pub mod conditions;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "CatalogSource",
    namespaced,
    status = "CatalogSourceStatus",
    shortname = "catsrc",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceSpec {
    pub source_type: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub display_name: Option<String>,
    pub publisher: Option<String>,
    pub priority: Option<i32>,
    pub secrets: Option<Vec<String>>,
    pub grpc_pod_config: Option<GrpcPodConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcPodConfig {
    pub security_context_config: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceStatus {
    pub connection_state: Option<ConnectionState>,
    pub message: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub address: Option<String>,
    pub last_observed_state: Option<String>,
}

impl CatalogSource {
    pub fn last_observed_state(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .connection_state
            .as_ref()?
            .last_observed_state
            .as_deref()
    }

    pub fn security_context_config(&self) -> Option<&str> {
        self.spec
            .grpc_pod_config
            .as_ref()?
            .security_context_config
            .as_deref()
    }
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "Subscription",
    namespaced,
    status = "SubscriptionStatus",
    shortname = "sub",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    pub channel: Option<String>,
    /// Package name.
    pub name: Option<String>,
    pub source: Option<String>,
    pub source_namespace: Option<String>,
    pub install_plan_approval: Option<String>,
    #[serde(rename = "startingCSV")]
    pub starting_csv: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub state: Option<String>,
    #[serde(rename = "currentCSV")]
    pub current_csv: Option<String>,
    #[serde(rename = "installedCSV")]
    pub installed_csv: Option<String>,
    pub install_plan_ref: Option<ObjectReference>,
    /// Most recent install plan, kept by OLM next to `installPlanRef`.
    pub installplan: Option<ObjectReference>,
    pub conditions: Option<Vec<StatusCondition>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectReference {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl Subscription {
    pub fn state(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.state.as_deref())
    }

    pub fn installed_csv(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.installed_csv.as_deref())
    }

    pub fn current_csv(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.current_csv.as_deref())
    }

    /// Name of the install plan the subscription points at, preferring
    /// `installPlanRef` over the older `installplan` field.
    pub fn install_plan_name(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        status
            .install_plan_ref
            .as_ref()
            .and_then(|r| non_empty(r.name.as_deref()))
            .or_else(|| {
                status
                    .installplan
                    .as_ref()
                    .and_then(|r| non_empty(r.name.as_deref()))
            })
    }

    pub fn condition_message(&self, type_: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .conditions
            .as_ref()?
            .iter()
            .find(|c| c.type_ == type_)
            .and_then(|c| c.message.as_deref())
    }
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1",
    kind = "OperatorGroup",
    namespaced,
    status = "OperatorGroupStatus",
    shortname = "og",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorGroupSpec {
    pub target_namespaces: Option<Vec<String>>,
    pub service_account_name: Option<String>,
    pub upgrade_strategy: Option<UpgradeStrategy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpgradeStrategy {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OperatorGroupStatus {
    pub namespaces: Option<Vec<String>>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "InstallPlan",
    namespaced,
    status = "InstallPlanStatus",
    shortname = "ip",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanSpec {
    pub approval: Option<String>,
    pub approved: Option<bool>,
    pub cluster_service_version_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstallPlanStatus {
    pub phase: Option<String>,
}

impl InstallPlan {
    pub fn phase(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.phase.as_deref())
    }

    pub fn is_approved(&self) -> bool {
        self.spec.approved.unwrap_or(false)
    }
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "ClusterServiceVersion",
    namespaced,
    status = "ClusterServiceVersionStatus",
    shortname = "csv",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    pub version: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterServiceVersionStatus {
    pub phase: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ClusterServiceVersion {
    pub fn phase(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.phase.as_deref())
    }

    /// Why the CSV is in its current phase, falling back to the reason code.
    pub fn message(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        non_empty(status.message.as_deref()).or_else(|| non_empty(status.reason.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_status_fields() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "Subscription",
            "metadata": {"name": "learn", "namespace": "ns-1"},
            "spec": {"channel": "beta", "name": "learn", "startingCSV": "learn.v0.0.1"},
            "status": {
                "state": "AtLatestKnown",
                "installedCSV": "learn.v0.0.3",
                "currentCSV": "learn.v0.0.3",
                "installplan": {"name": "install-old"},
                "installPlanRef": {"name": "install-abcde", "namespace": "ns-1"},
                "conditions": [
                    {"type": "ResolutionFailed", "status": "False", "message": "all good"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(sub.spec.starting_csv.as_deref(), Some("learn.v0.0.1"));
        assert_eq!(sub.state(), Some(conditions::AT_LATEST_KNOWN));
        assert_eq!(sub.installed_csv(), Some("learn.v0.0.3"));
        assert_eq!(sub.current_csv(), Some("learn.v0.0.3"));
        assert_eq!(sub.install_plan_name(), Some("install-abcde"));
        assert_eq!(
            sub.condition_message(conditions::RESOLUTION_FAILED),
            Some("all good")
        );
    }

    #[test]
    fn empty_status_strings_read_as_missing() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "learn"},
            "spec": {},
            "status": {
                "state": "",
                "installPlanRef": {"name": ""},
                "installplan": {"name": "install-x"}
            }
        }))
        .unwrap();

        assert_eq!(sub.state(), None);
        assert_eq!(sub.install_plan_name(), Some("install-x"));
    }

    #[test]
    fn catalog_source_connection_state() {
        let catsrc: CatalogSource = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "cs-1", "namespace": "ns-1"},
            "spec": {"sourceType": "grpc", "image": "quay.io/olm/index:v1"},
            "status": {"connectionState": {"lastObservedState": "READY"}}
        }))
        .unwrap();

        assert_eq!(catsrc.last_observed_state(), Some(conditions::READY));
        assert_eq!(catsrc.security_context_config(), None);
    }

    #[test]
    fn install_plan_and_csv_phases() {
        let plan: InstallPlan = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "install-abcde", "namespace": "ns-1"},
            "spec": {"approval": "Manual", "approved": true},
            "status": {"phase": "Complete"}
        }))
        .unwrap();
        assert!(plan.is_approved());
        assert_eq!(plan.phase(), Some(conditions::INSTALL_PLAN_COMPLETE));

        let csv: ClusterServiceVersion = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "learn.v0.0.1", "namespace": "ns-1"},
            "spec": {},
            "status": {"phase": "Failed", "reason": "InstallCheckFailed", "message": ""}
        }))
        .unwrap();
        assert_eq!(csv.phase(), Some(conditions::CSV_FAILED));
        assert_eq!(csv.message(), Some("InstallCheckFailed"));
    }
}
