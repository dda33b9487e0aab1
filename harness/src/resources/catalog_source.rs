// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use crds::conditions::{
    DEFAULT_CATALOG_POLL_INTERVAL, MARKETPLACE_NAMESPACE, READY, RESTRICTED_SECURITY_CONTEXT,
};
use log::info;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use super::{ClusterResource, Creatable, Creation};
use crate::Result;
use crate::query::Condition;
use crate::scope::TestScope;

#[derive(Debug, Clone, Default)]
pub struct CatalogSource {
    pub name: String,
    pub namespace: String,
    /// Index image for `grpc` sources.
    pub address: String,
    pub display_name: String,
    pub publisher: String,
    pub source_type: String,
    pub secret: String,
    /// Registry poll interval; `10m0s` when empty.
    pub interval: String,
    pub image_template: String,
    pub template: PathBuf,
}

impl CatalogSource {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        address: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            address: address.into(),
            source_type: "grpc".to_string(),
            template: template.into(),
            ..Default::default()
        }
    }

    pub fn ready(&self) -> Condition {
        Condition::equals(self.field("status.connectionState.lastObservedState"), READY)
            .every(Duration::from_secs(10))
            .within(Duration::from_secs(180))
            .described(format!("catsrc {} lastObservedState is not {READY}", self.name))
    }

    pub async fn status(&self, scope: &TestScope) -> Result<Option<crds::CatalogSource>> {
        self.fetch(scope).await
    }

    /// Make the registry pod run under the restricted security context
    /// unless the source already chose one. Sources in the marketplace
    /// namespace are left alone. Returns whether a patch was sent.
    pub async fn ensure_restricted_security_context(&self, scope: &TestScope) -> Result<bool> {
        if self.namespace == MARKETPLACE_NAMESPACE {
            return Ok(false);
        }
        let Some(current) = self.status(scope).await? else {
            return Ok(false);
        };
        if current.security_context_config().is_some() {
            return Ok(false);
        }
        self.patch(
            scope,
            &json!({
                "spec": {"grpcPodConfig": {"securityContextConfig": RESTRICTED_SECURITY_CONTEXT}}
            }),
        )
        .await?;
        info!("catsrc {} now uses the {RESTRICTED_SECURITY_CONTEXT} security context", self.name);
        Ok(true)
    }
}

impl ClusterResource for CatalogSource {
    fn kind(&self) -> &str {
        "catsrc"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for CatalogSource {
    fn creation(&self) -> Creation {
        let interval = if self.interval.is_empty() {
            DEFAULT_CATALOG_POLL_INTERVAL.to_string()
        } else {
            self.interval.clone()
        };
        Creation::Template {
            template: self.template.clone(),
            parameters: vec![
                ("NAME", self.name.clone()),
                ("NAMESPACE", self.namespace.clone()),
                ("ADDRESS", self.address.clone()),
                ("SECRET", self.secret.clone()),
                // quoted so display names with spaces survive the template
                ("DISPLAYNAME", format!("\"{}\"", self.display_name)),
                ("PUBLISHER", format!("\"{}\"", self.publisher)),
                ("SOURCETYPE", self.source_type.clone()),
                ("INTERVAL", interval),
                ("IMAGETEMPLATE", self.image_template.clone()),
            ],
        }
    }

    fn readiness(&self) -> Vec<Condition> {
        vec![self.ready()]
    }
}
