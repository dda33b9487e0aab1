// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

//! Descriptors for the objects scenarios create and inspect.
//!
//! A descriptor is plain data naming one object. [`ClusterResource`] gives
//! every descriptor deletion, patching and reading; [`Creatable`] adds
//! template-driven creation with optional readiness checks.

use kube::core::DynamicObject;
use log::info;
use serde::de::DeserializeOwned;
use std::path::PathBuf;

use crate::cli::Invocation;
use crate::query::{Condition, Query};
use crate::registry::ResourceRef;
use crate::scope::TestScope;
use crate::{Error, Result};

pub mod catalog_source;
pub mod config_map;
pub mod crd;
pub mod install_plan;
pub mod operator_group;
pub mod project;
pub mod rbac;
pub mod secret;
pub mod service_account;
pub mod subscription;

pub use catalog_source::CatalogSource;
pub use config_map::ConfigMap;
pub use crd::{Crd, CustomResource};
pub use install_plan::{CsvRef, InstallPlanRef};
pub use operator_group::OperatorGroup;
pub use project::Project;
pub use rbac::{Role, RoleBinding};
pub use secret::Secret;
pub use service_account::ServiceAccount;
pub use subscription::{Approval, Proxy, Subscription};

/// How an object comes into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
    /// `process` the template with these parameters, then `apply` it.
    Template {
        template: PathBuf,
        parameters: Vec<(&'static str, String)>,
    },
    /// A single command, e.g. `new-project`.
    Command(Invocation),
}

#[allow(async_fn_in_trait)]
pub trait ClusterResource {
    /// Short kind as accepted by the client (`sub`, `catsrc`, ...).
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    /// `None` for cluster-scoped kinds.
    fn namespace(&self) -> Option<&str>;

    fn resource_ref(&self) -> ResourceRef {
        match self.namespace() {
            Some(ns) => ResourceRef::namespaced(self.kind(), self.name(), ns),
            None => ResourceRef::cluster(self.kind(), self.name()),
        }
    }

    fn check_identity(&self) -> Result<()> {
        let missing = if self.name().is_empty() {
            Some("name")
        } else if self.namespace().is_some_and(str::is_empty) {
            Some("namespace")
        } else {
            None
        };
        match missing {
            Some(missing) => Err(Error::IncompleteIdentity {
                kind: self.kind().to_string(),
                name: self.name().to_string(),
                missing,
            }),
            None => Ok(()),
        }
    }

    fn query(&self) -> Query {
        self.resource_ref().query()
    }

    /// Query one field of this object, e.g. `status.phase`.
    fn field(&self, path: &str) -> Query {
        self.query().field(path)
    }

    async fn exists(&self, scope: &TestScope) -> Result<bool> {
        Ok(self.fetch::<serde_json::Value>(scope).await?.is_some())
    }

    async fn fetch<T: DeserializeOwned>(&self, scope: &TestScope) -> Result<Option<T>> {
        self.check_identity()?;
        scope.get_json(&self.resource_ref()).await
    }

    /// Read the object back and report the identity the cluster holds.
    async fn fetch_identity(&self, scope: &TestScope) -> Result<Option<ResourceRef>> {
        let Some(object) = self.fetch::<DynamicObject>(scope).await? else {
            return Ok(None);
        };
        let name = object.metadata.name.unwrap_or_default();
        Ok(Some(match object.metadata.namespace {
            Some(ns) => ResourceRef::namespaced(self.kind(), name, ns),
            None => ResourceRef::cluster(self.kind(), name),
        }))
    }

    async fn patch(&self, scope: &TestScope, payload: &serde_json::Value) -> Result<()> {
        self.check_identity()?;
        scope.patch(&self.resource_ref(), payload).await
    }

    /// Delete and wait until gone. Missing objects are fine. The object
    /// stops being owned by the scope once it is gone.
    async fn delete(&self, scope: &TestScope) -> Result<()> {
        self.check_identity()?;
        let resource = self.resource_ref();
        resource.delete(scope.cli(), scope.config()).await?;
        scope.unregister(&resource);
        Ok(())
    }
}

#[allow(async_fn_in_trait)]
pub trait Creatable: ClusterResource {
    fn creation(&self) -> Creation;

    /// Checks that must hold before the object counts as usable.
    fn readiness(&self) -> Vec<Condition> {
        Vec::new()
    }

    async fn create(&self, scope: &TestScope) -> Result<ResourceRef> {
        create_resource(self, scope).await
    }

    async fn verify(&mut self, scope: &TestScope) -> Result<()> {
        verify_readiness(&*self, scope, self.readiness()).await
    }

    async fn create_and_verify(&mut self, scope: &TestScope) -> Result<ResourceRef> {
        let resource = self.create(scope).await?;
        self.verify(scope).await?;
        Ok(resource)
    }
}

/// Create `resource` through its [`Creation`] and register it with the
/// scope. Overriding `create` implementations call this for the common part.
pub async fn create_resource<R>(resource: &R, scope: &TestScope) -> Result<ResourceRef>
where
    R: Creatable + ?Sized,
{
    resource.check_identity()?;
    let target = resource.resource_ref();
    match resource.creation() {
        Creation::Template {
            template,
            parameters,
        } => scope.apply_template(&target, &template, &parameters).await?,
        Creation::Command(invocation) => {
            scope
                .run(invocation)
                .await
                .map_err(|e| Error::Creation {
                    resource: target.clone(),
                    reason: e.to_string(),
                })?;
        }
    }
    info!("Created {target}");
    scope.register(target.clone());
    Ok(target)
}

/// Wait for each condition in turn; on the first timeout, attach
/// diagnostics for `resource` and its namespace.
pub async fn verify_readiness<R>(
    resource: &R,
    scope: &TestScope,
    conditions: Vec<Condition>,
) -> Result<()>
where
    R: ClusterResource + ?Sized,
{
    for condition in conditions {
        if let Err(err) = scope.wait_for(&condition).await {
            let diagnostics = scope
                .collect_diagnostics(resource.namespace(), Some(&resource.resource_ref()))
                .await;
            return Err(err.with_diagnostics(diagnostics));
        }
    }
    Ok(())
}

/// Template parameters whose value is empty are left out so the template's
/// own defaults apply.
pub(crate) fn non_empty_params(
    parameters: impl IntoIterator<Item = (&'static str, String)>,
) -> Vec<(&'static str, String)> {
    parameters
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
}
