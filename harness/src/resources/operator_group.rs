// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use log::info;
use std::path::PathBuf;

use super::{ClusterResource, Creatable, Creation, non_empty_params};
use crate::Result;
use crate::cli::Invocation;
use crate::registry::ResourceRef;
use crate::scope::TestScope;

#[derive(Debug, Clone, Default)]
pub struct OperatorGroup {
    pub name: String,
    pub namespace: String,
    /// Label selecting the target namespaces of a multi-namespace group.
    pub multi_namespace_label: String,
    pub service_account_name: String,
    pub upgrade_strategy: String,
    pub template: PathBuf,
}

impl OperatorGroup {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            template: template.into(),
            ..Default::default()
        }
    }

    /// A namespace holds at most one operator group; create this one only
    /// if there is none yet. Returns the created reference, if any.
    pub async fn create_if_absent(&self, scope: &TestScope) -> Result<Option<ResourceRef>> {
        let existing = scope
            .run(
                Invocation::new("get")
                    .args(["operatorgroup", "--ignore-not-found"])
                    .namespace(&self.namespace),
            )
            .await?;
        if !existing.trim().is_empty() {
            info!("{} already has an operator group", self.namespace);
            return Ok(None);
        }
        self.create(scope).await.map(Some)
    }

    pub async fn observe(&self, scope: &TestScope) -> Result<Option<crds::OperatorGroup>> {
        self.fetch(scope).await
    }
}

impl ClusterResource for OperatorGroup {
    fn kind(&self) -> &str {
        "og"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for OperatorGroup {
    fn creation(&self) -> Creation {
        let mut parameters = vec![
            ("NAME", self.name.clone()),
            ("NAMESPACE", self.namespace.clone()),
        ];
        parameters.extend(non_empty_params([
            ("MULTINSLABEL", self.multi_namespace_label.clone()),
            ("SERVICE_ACCOUNT_NAME", self.service_account_name.clone()),
            ("UPGRADESTRATEGY", self.upgrade_strategy.clone()),
        ]));
        Creation::Template {
            template: self.template.clone(),
            parameters,
        }
    }
}
