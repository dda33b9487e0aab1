// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use futures_util::FutureExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{Cli, ExecError, Invocation};
use crate::config::HarnessConfig;
use crate::query::{Condition, Observed};
use crate::registry::{CleanupReport, OwnershipRegistry, ResourceRef};
use crate::timer::Poller;
use crate::{Error, Result, random_suffix};

/// Everything a descriptor operation needs: who is running, how to reach
/// the cluster, and where to record what was created.
#[derive(Debug, Clone)]
pub struct TestScope {
    test_id: Arc<str>,
    cli: Cli,
    registry: OwnershipRegistry,
    config: Arc<HarnessConfig>,
}

impl TestScope {
    pub fn new(
        test_id: impl Into<String>,
        cli: Cli,
        registry: OwnershipRegistry,
        config: HarnessConfig,
    ) -> Self {
        let test_id: Arc<str> = Arc::from(test_id.into());
        registry.add_test(&test_id);
        Self {
            test_id,
            cli,
            registry,
            config: Arc::new(config),
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn register(&self, resource: ResourceRef) {
        debug!("{} owns {resource}", self.test_id);
        self.registry.add(&self.test_id, resource);
    }

    pub fn unregister(&self, resource: &ResourceRef) -> bool {
        self.registry.remove(&self.test_id, resource)
    }

    pub fn owned(&self) -> Vec<ResourceRef> {
        self.registry.refs(&self.test_id)
    }

    pub async fn run(&self, invocation: Invocation) -> Result<String, ExecError> {
        self.cli.run(invocation).await
    }

    pub async fn wait_for(&self, condition: &Condition) -> Result<Observed> {
        condition.wait(&self.cli).await
    }

    /// Render `template` with `parameters` into a file under the output
    /// directory and return its path. Rendering is read-only, so it is
    /// retried for a short while.
    pub async fn process_template(
        &self,
        template: &Path,
        parameters: &[(&str, String)],
    ) -> Result<PathBuf, String> {
        let file = self
            .config
            .output_dir
            .join(format!("{}-{}-olm-config.json", self.test_id, random_suffix()));
        let mut invocation = Invocation::new("process")
            .arg("--ignore-unknown-parameters=true")
            .arg("-f")
            .arg(template.display().to_string())
            .arg("-p");
        for (key, value) in parameters {
            invocation = invocation.arg(format!("{key}={value}"));
        }
        let invocation = invocation.output_to(&file);

        let cli = &self.cli;
        Poller::new()
            .with_timeout(Duration::from_secs(15))
            .with_interval(Duration::from_secs(3))
            .with_error_message(format!("can not process {}", template.display()))
            .poll_async(move || cli.run(invocation.clone()))
            .await
            .map_err(|e| e.to_string())?;

        debug!("Processed {} into {}", template.display(), file.display());
        Ok(file)
    }

    /// Render and apply a template as admin. `resource` is only used for
    /// error reporting; registration is up to the caller.
    pub async fn apply_template(
        &self,
        resource: &ResourceRef,
        template: &Path,
        parameters: &[(&str, String)],
    ) -> Result<()> {
        let creation_error = |reason: String| Error::Creation {
            resource: resource.clone(),
            reason,
        };

        let file = self
            .process_template(template, parameters)
            .await
            .map_err(creation_error)?;
        let applied = self
            .cli
            .run(Invocation::new("apply").arg("-f").arg(file.display().to_string()))
            .await;
        if let Err(e) = tokio::fs::remove_file(&file).await {
            debug!("Could not remove {}: {e}", file.display());
        }
        applied.map_err(|e| creation_error(e.to_string()))?;
        Ok(())
    }

    /// Read an object as JSON. `None` when it does not exist.
    pub async fn get_json<T: DeserializeOwned>(&self, resource: &ResourceRef) -> Result<Option<T>> {
        let invocation = Invocation::new("get")
            .args(resource.target_args())
            .args(["-o", "json", "--ignore-not-found"]);
        let command = invocation.to_string();
        let output = match self.cli.run(invocation).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if output.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&output)
            .map(Some)
            .map_err(|source| Error::Parse { command, source })
    }

    /// Merge-patch an object. Ownership is unchanged.
    pub async fn patch(&self, resource: &ResourceRef, payload: &serde_json::Value) -> Result<()> {
        let invocation = Invocation::new("patch")
            .args(resource.target_args())
            .args(["--type", "merge", "-p"])
            .arg(payload.to_string());
        self.cli.run(invocation).await?;
        info!("Patched {resource}");
        Ok(())
    }

    /// Best-effort dump of the state around a failed assertion. Commands
    /// that fail are noted in the output rather than reported.
    pub async fn collect_diagnostics(
        &self,
        namespace: Option<&str>,
        resource: Option<&ResourceRef>,
    ) -> String {
        let mut invocations = Vec::new();
        if let Some(resource) = resource {
            invocations.push(Invocation::new("describe").args(resource.target_args()));
        }
        if let Some(ns) = namespace {
            for kind in ["pods", "events", "installplan", "csv"] {
                invocations.push(Invocation::new("get").arg(kind).namespace(ns));
            }
        }

        let mut report = String::new();
        for invocation in invocations {
            let header = invocation.to_string();
            let body = match self.cli.run(invocation).await {
                Ok(output) => output,
                Err(e) => format!("<unavailable: {e}>"),
            };
            report.push_str(&format!("$ {header}\n{}\n", body.trim_end()));
        }
        report
    }

    pub async fn cleanup(&self) -> CleanupReport {
        self.registry
            .cleanup(&self.test_id, &self.cli, &self.config)
            .await
    }
}

impl OwnershipRegistry {
    /// Run `body` for `test_id` and unwind everything it created, whether it
    /// returns, fails or panics. The body's own outcome wins over any
    /// cleanup failure.
    pub async fn run_scoped<F, Fut, T, E>(
        &self,
        test_id: &str,
        cli: Cli,
        config: HarnessConfig,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(TestScope) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let scope = TestScope::new(test_id, cli, self.clone(), config);
        info!("Running {test_id}");

        let inner = scope.clone();
        let outcome = AssertUnwindSafe(async move { body(inner).await })
            .catch_unwind()
            .await;

        let report = scope.cleanup().await;
        if !report.is_clean() {
            warn!(
                "{test_id} finished with {} resources left behind",
                report.failed.len()
            );
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
