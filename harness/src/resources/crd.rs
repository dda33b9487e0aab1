// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use super::{ClusterResource, Creatable, Creation, create_resource};
use crate::query::Condition;
use crate::registry::ResourceRef;
use crate::scope::TestScope;
use crate::timer::Poller;
use crate::{Error, Result};

/// A CustomResourceDefinition, cluster-scoped.
#[derive(Debug, Clone, Default)]
pub struct Crd {
    pub name: String,
    pub template: PathBuf,
}

impl Crd {
    pub fn new(name: impl Into<String>, template: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    pub fn established(&self) -> Condition {
        Condition::equals(self.field("status.conditions[type=Established].status"), "True")
            .described(format!("crd {} is not established", self.name))
    }
}

impl ClusterResource for Crd {
    fn kind(&self) -> &str {
        "crd"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        None
    }
}

impl Creatable for Crd {
    fn creation(&self) -> Creation {
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![("NAME", self.name.clone())],
        }
    }

    fn readiness(&self) -> Vec<Condition> {
        vec![self.established()]
    }
}

/// An instance of an operator-provided API, e.g. an `etcdcluster`.
#[derive(Debug, Clone, Default)]
pub struct CustomResource {
    /// Resource type as the client knows it.
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub template: PathBuf,
}

impl CustomResource {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            template: template.into(),
        }
    }
}

impl ClusterResource for CustomResource {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for CustomResource {
    fn creation(&self) -> Creation {
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![
                ("NAME", self.name.clone()),
                ("NAMESPACE", self.namespace.clone()),
            ],
        }
    }

    /// The API may only become available once the operator that owns it
    /// is running, so creation is retried.
    async fn create(&self, scope: &TestScope) -> Result<ResourceRef> {
        self.check_identity()?;
        let resource = self;
        Poller::new()
            .with_timeout(Duration::from_secs(60))
            .with_interval(Duration::from_secs(30))
            .with_error_message(format!("can not create {} {}", self.kind, self.name))
            .poll_async(move || async move {
                let created = create_resource(resource, scope).await;
                if let Err(e) = &created {
                    debug!("{e}");
                }
                created
            })
            .await
            .map_err(|e| Error::Creation {
                resource: self.resource_ref(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RawOutput;
    use crate::config::HarnessConfig;
    use crate::mock_cli::MockCli;
    use crate::registry::OwnershipRegistry;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn custom_resource_apply_is_retried() {
        let applies = Arc::new(AtomicU32::new(0));
        let mock = {
            let applies = applies.clone();
            MockCli::new(move |inv| match inv.verb.as_str() {
                "process" => RawOutput::ok("{}"),
                _ if applies.fetch_add(1, Ordering::SeqCst) == 0 => RawOutput::failed(
                    1,
                    "error: resource mapping not found for kind \"EtcdCluster\"",
                ),
                _ => RawOutput::ok("etcdcluster.etcd.database.coreos.com/example created"),
            })
        };
        let scope = TestScope::new(
            "cr-test",
            mock.cli(),
            OwnershipRegistry::new(),
            HarnessConfig::default(),
        );

        let created = CustomResource::new("etcdcluster", "example", "ns-1", "cr.yaml")
            .create(&scope)
            .await
            .unwrap();

        assert_eq!(applies.load(Ordering::SeqCst), 2);
        assert_eq!(scope.owned(), vec![created]);
    }

    #[test]
    fn crd_is_cluster_scoped() {
        let crd = Crd::new("etcdclusters.etcd.database.coreos.com", "crd.yaml");
        assert_eq!(
            crd.resource_ref(),
            ResourceRef::cluster("crd", "etcdclusters.etcd.database.coreos.com")
        );
        assert_eq!(
            crd.established().query.invocation().argv(),
            vec![
                "get",
                "crd",
                "etcdclusters.etcd.database.coreos.com",
                "--ignore-not-found",
                "-o",
                "json"
            ]
        );
    }
}
