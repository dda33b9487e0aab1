// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
//
// SPDX-License-Identifier: MIT

use k8s_openapi::api::core::v1::ConfigMap as ConfigMapObject;
use std::path::PathBuf;

use super::{ClusterResource, Creatable, Creation};
use crate::Result;
use crate::scope::TestScope;

#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    pub name: String,
    pub namespace: String,
    pub template: PathBuf,
}

impl ConfigMap {
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

    pub async fn data_value(&self, scope: &TestScope, key: &str) -> Result<Option<String>> {
        let cm: Option<ConfigMapObject> = self.fetch(scope).await?;
        Ok(cm.and_then(|cm| cm.data?.remove(key)))
    }
}

impl ClusterResource for ConfigMap {
    fn kind(&self) -> &str {
        "cm"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for ConfigMap {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RawOutput;
    use crate::config::HarnessConfig;
    use crate::mock_cli::MockCli;
    use crate::registry::OwnershipRegistry;
    use serde_json::json;

    #[tokio::test]
    async fn data_value_reads_one_key() {
        let mock = MockCli::new(|inv| match inv.args.get(1).map(String::as_str) {
            Some("olm-config") => RawOutput::ok(
                json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": "olm-config", "namespace": "ns-1"},
                    "data": {"features": "packageServerSyncInterval=5m"}
                })
                .to_string(),
            ),
            _ => RawOutput::empty(),
        });
        let scope = TestScope::new(
            "cm-test",
            mock.cli(),
            OwnershipRegistry::new(),
            HarnessConfig::default(),
        );
        let cm = ConfigMap::new("olm-config", "ns-1", "cm.yaml");

        assert_eq!(
            cm.data_value(&scope, "features").await.unwrap().as_deref(),
            Some("packageServerSyncInterval=5m")
        );
        assert_eq!(cm.data_value(&scope, "missing").await.unwrap(), None);
        let gone = ConfigMap::new("gone", "ns-1", "cm.yaml");
        assert_eq!(gone.data_value(&scope, "features").await.unwrap(), None);
    }
}
