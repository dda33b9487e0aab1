// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use crds::conditions::NAMESPACE_ACTIVE;
use log::info;

use super::{ClusterResource, Creatable, Creation, create_resource};
use crate::Result;
use crate::cli::Invocation;
use crate::query::Condition;
use crate::registry::ResourceRef;
use crate::scope::TestScope;

/// A namespace created through `new-project`.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Create unless a namespace with this name exists. Pre-existing
    /// namespaces are not taken over by the scope.
    pub async fn create_if_absent(&self, scope: &TestScope) -> Result<Option<ResourceRef>> {
        if self.exists(scope).await? {
            info!("project {} already exists", self.name);
            return Ok(None);
        }
        self.create(scope).await.map(Some)
    }

    pub async fn label(&self, scope: &TestScope, key: &str, value: &str) -> Result<()> {
        scope
            .run(
                Invocation::new("label")
                    .args(["ns", self.name.as_str()])
                    .arg(format!("{key}={value}"))
                    .arg("--overwrite"),
            )
            .await?;
        Ok(())
    }
}

impl ClusterResource for Project {
    fn kind(&self) -> &str {
        "project"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        None
    }
}

impl Creatable for Project {
    fn creation(&self) -> Creation {
        Creation::Command(
            Invocation::new("new-project").args([self.name.as_str(), "--skip-config-write"]),
        )
    }

    fn readiness(&self) -> Vec<Condition> {
        vec![
            Condition::equals(self.field("status.phase"), NAMESPACE_ACTIVE)
                .described(format!("project {} is not {NAMESPACE_ACTIVE}", self.name)),
        ]
    }

    /// Leftovers of an earlier run with the same name are removed first.
    async fn create(&self, scope: &TestScope) -> Result<ResourceRef> {
        self.check_identity()?;
        self.resource_ref()
            .delete(scope.cli(), scope.config())
            .await?;
        create_resource(self, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RawOutput;
    use crate::config::HarnessConfig;
    use crate::mock_cli::MockCli;
    use crate::registry::OwnershipRegistry;

    #[tokio::test]
    async fn create_clears_leftovers_first() {
        let mock = MockCli::new(|inv| match inv.verb.as_str() {
            "delete" => RawOutput::empty(),
            _ => RawOutput::ok("Now using project \"ns-1\""),
        });
        let scope = TestScope::new(
            "project-test",
            mock.cli(),
            OwnershipRegistry::new(),
            HarnessConfig::default(),
        );

        let created = Project::new("ns-1").create(&scope).await.unwrap();

        assert_eq!(created, ResourceRef::cluster("project", "ns-1"));
        assert_eq!(
            mock.commands(),
            vec![
                "delete project ns-1 --ignore-not-found",
                "new-project ns-1 --skip-config-write",
            ]
        );
        assert_eq!(scope.owned(), vec![created]);
    }

    #[tokio::test]
    async fn empty_name_is_rejected_locally() {
        let mock = MockCli::new(|_| RawOutput::empty());
        let scope = TestScope::new(
            "project-test",
            mock.cli(),
            OwnershipRegistry::new(),
            HarnessConfig::default(),
        );

        let err = Project::new("").create(&scope).await.unwrap_err();
        assert!(matches!(err, crate::Error::IncompleteIdentity { missing: "name", .. }));
        assert!(mock.invocations().is_empty());
    }
}
