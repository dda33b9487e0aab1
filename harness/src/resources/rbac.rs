// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use k8s_openapi::api::rbac::v1::{PolicyRule, Role as RoleObject};
use serde_json::json;
use std::path::PathBuf;

use super::{ClusterResource, Creatable, Creation};
use crate::Result;
use crate::scope::TestScope;

#[derive(Debug, Clone, Default)]
pub struct Role {
    pub name: String,
    pub namespace: String,
    pub template: PathBuf,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            template: template.into(),
        }
    }

    pub async fn rules(&self, scope: &TestScope) -> Result<Vec<PolicyRule>> {
        let role: Option<RoleObject> = self.fetch(scope).await?;
        Ok(role.and_then(|r| r.rules).unwrap_or_default())
    }

    /// Replace the rules with those that do not mention `api_group`.
    /// Returns how many rules were dropped.
    pub async fn drop_rules_for_group(&self, scope: &TestScope, api_group: &str) -> Result<usize> {
        let rules = self.rules(scope).await?;
        let before = rules.len();
        let kept: Vec<PolicyRule> = rules
            .into_iter()
            .filter(|rule| {
                !rule
                    .api_groups
                    .as_ref()
                    .is_some_and(|groups| groups.iter().any(|g| g == api_group))
            })
            .collect();
        let dropped = before - kept.len();
        if dropped > 0 {
            self.patch(scope, &json!({"rules": kept})).await?;
        }
        Ok(dropped)
    }
}

impl ClusterResource for Role {
    fn kind(&self) -> &str {
        "role"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for Role {
    fn creation(&self) -> Creation {
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![
                ("NAME", self.name.clone()),
                ("NAMESPACE", self.namespace.clone()),
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleBinding {
    pub name: String,
    pub namespace: String,
    pub service_account: String,
    pub role_name: String,
    pub template: PathBuf,
}

impl RoleBinding {
    /// Binds `role_name` to the service account `service_account` in
    /// `namespace`.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        service_account: impl Into<String>,
        role_name: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            service_account: service_account.into(),
            role_name: role_name.into(),
            template: template.into(),
        }
    }
}

impl ClusterResource for RoleBinding {
    fn kind(&self) -> &str {
        "rolebinding"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for RoleBinding {
    fn creation(&self) -> Creation {
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![
                ("NAME", self.name.clone()),
                ("NAMESPACE", self.namespace.clone()),
                ("SA_NAME", self.service_account.clone()),
                ("ROLE_NAME", self.role_name.clone()),
            ],
        }
    }
}
