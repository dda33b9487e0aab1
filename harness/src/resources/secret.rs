// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
//
// SPDX-License-Identifier: MIT

use k8s_openapi::api::core::v1::Secret as SecretObject;
use std::path::PathBuf;

use super::{ClusterResource, Creatable, Creation};
use crate::Result;
use crate::scope::TestScope;

#[derive(Debug, Clone, Default)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    /// Service account the token secret is bound to.
    pub service_account: String,
    pub secret_type: String,
    pub template: PathBuf,
}

impl Secret {
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

    /// Decoded value of `data[key]`.
    pub async fn data_value(&self, scope: &TestScope, key: &str) -> Result<Option<Vec<u8>>> {
        let secret: Option<SecretObject> = self.fetch(scope).await?;
        Ok(secret.and_then(|s| s.data?.remove(key)).map(|bytes| bytes.0))
    }
}

impl ClusterResource for Secret {
    fn kind(&self) -> &str {
        "secret"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for Secret {
    fn creation(&self) -> Creation {
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![
                ("NAME", self.name.clone()),
                ("NAMESPACE", self.namespace.clone()),
                ("SANAME", self.service_account.clone()),
                ("TYPE", self.secret_type.clone()),
            ],
        }
    }
}
