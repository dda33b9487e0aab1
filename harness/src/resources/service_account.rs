// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use log::info;
use std::path::PathBuf;
use std::time::Duration;

use super::ClusterResource;
use crate::cli::Invocation;
use crate::query::{Condition, Query};
use crate::scope::TestScope;
use crate::{Error, Result, random_suffix};

/// A service account the scenario does not own, usually one an operator
/// group or CSV points at. Scenarios may delete it and put it back from a
/// saved definition.
#[derive(Debug, Clone, Default)]
pub struct ServiceAccount {
    pub name: String,
    pub namespace: String,
    definition: Option<PathBuf>,
}

impl ServiceAccount {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            definition: None,
        }
    }

    /// File written by the last [`Self::save_definition`].
    pub fn definition(&self) -> Option<&PathBuf> {
        self.definition.as_ref()
    }

    /// Store the current object as JSON under the output directory.
    pub async fn save_definition(&mut self, scope: &TestScope) -> Result<PathBuf> {
        self.check_identity()?;
        let file = scope.config().output_dir.join(format!(
            "{}-{}-sa-config.json",
            scope.test_id(),
            random_suffix()
        ));
        let invocation = Invocation::new("get")
            .args(self.resource_ref().target_args())
            .args(["-o", "json"])
            .output_to(&file);
        scope.run(invocation).await?;
        info!("Saved sa {} to {}", self.name, file.display());
        self.definition = Some(file.clone());
        Ok(file)
    }

    /// Apply the saved definition again. Ownership is unchanged.
    pub async fn reapply(&self, scope: &TestScope) -> Result<()> {
        let Some(file) = &self.definition else {
            return Err(Error::Missing {
                resource: self.resource_ref(),
                what: "saved definition".to_string(),
            });
        };
        scope
            .run(Invocation::new("apply").arg("-f").arg(file.display().to_string()))
            .await?;
        info!("Reapplied sa {} in {}", self.name, self.namespace);
        Ok(())
    }

    /// `auth can-i <verb> <resource>` impersonating this account.
    pub fn can_i(&self, verb: &str, resource: &str) -> Query {
        let user = format!("system:serviceaccount:{}:{}", self.namespace, self.name);
        let args = ["can-i", verb, resource, "--as", user.as_str(), "-n", self.namespace.as_str()];
        Query::command("auth", args).answers_on_failure()
    }

    /// The account's answer to creating `resource` contains `expected`,
    /// e.g. `yes` or `no`. Permission changes propagate slowly.
    pub fn check_auth(&self, expected: &str, resource: &str) -> Condition {
        Condition::contains(self.can_i("create", resource), expected)
            .every(Duration::from_secs(20))
            .within(Duration::from_secs(420))
            .described(format!(
                "sa {} expects {expected} permission to create {resource}",
                self.name
            ))
    }
}

impl ClusterResource for ServiceAccount {
    fn kind(&self) -> &str {
        "sa"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}
