// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use crds::conditions::{AT_LATEST_KNOWN, RESOLUTION_FAILED, UPGRADE_PENDING};
use log::{info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::{ClusterResource, Creatable, Creation, CsvRef, InstallPlanRef, verify_readiness};
use crate::cli::Invocation;
use crate::query::Condition;
use crate::scope::TestScope;
use crate::timer::Poller;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Approval {
    #[default]
    Automatic,
    Manual,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approval::Automatic => crds::conditions::APPROVAL_AUTOMATIC,
            Approval::Manual => crds::conditions::APPROVAL_MANUAL,
        }
    }
}

/// Proxy settings injected into the operator deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxy {
    pub http: String,
    pub https: String,
    pub no_proxy: String,
}

#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub name: String,
    pub namespace: String,
    pub channel: String,
    pub approval: Approval,
    /// Operator package to install.
    pub package: String,
    pub source: String,
    pub source_namespace: String,
    pub starting_csv: String,
    pub config_map_ref: String,
    pub secret_ref: String,
    pub proxy: Option<Proxy>,
    pub template: PathBuf,
    installed_csv: Option<String>,
}

#[derive(Deserialize)]
struct InstallPlanList {
    #[serde(default)]
    items: Vec<crds::InstallPlan>,
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        package: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            package: package.into(),
            template: template.into(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Catalog source the package is resolved from.
    pub fn with_source(mut self, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.source = name.into();
        self.source_namespace = namespace.into();
        self
    }

    pub fn with_approval(mut self, approval: Approval) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_starting_csv(mut self, csv: impl Into<String>) -> Self {
        self.starting_csv = csv.into();
        self
    }

    pub fn with_config_map_ref(mut self, name: impl Into<String>) -> Self {
        self.config_map_ref = name.into();
        self
    }

    pub fn with_secret_ref(mut self, name: impl Into<String>) -> Self {
        self.secret_ref = name.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// CSV last resolved by [`Self::refresh`] or a creation check.
    pub fn installed_csv(&self) -> Option<&str> {
        self.installed_csv.as_deref()
    }

    pub fn csv(&self) -> Option<CsvRef> {
        self.installed_csv
            .as_ref()
            .map(|name| CsvRef::new(name, &self.namespace))
    }

    pub fn state_is(&self, state: &str) -> Condition {
        Condition::equals(self.field("status.state"), state)
            .described(format!("sub {} state is not {state}", self.name))
    }

    pub fn at_latest_known(&self) -> Condition {
        self.state_is(AT_LATEST_KNOWN)
            .every(Duration::from_secs(5))
            .within(Duration::from_secs(360))
    }

    pub async fn observe(&self, scope: &TestScope) -> Result<Option<crds::Subscription>> {
        self.fetch(scope).await
    }

    /// Re-read `status.installedCSV`. A newly seen CSV is registered with
    /// the scope so it is removed with the subscription.
    pub async fn refresh(&mut self, scope: &TestScope) -> Result<Option<String>> {
        let observed = self.observe(scope).await?;
        let Some(csv) = observed.as_ref().and_then(|s| s.installed_csv()) else {
            return Ok(None);
        };
        let csv = csv.to_string();
        if self.installed_csv.as_deref() != Some(csv.as_str()) {
            info!("sub {} installed {csv}", self.name);
            scope.register(CsvRef::new(&csv, &self.namespace).resource_ref());
            self.installed_csv = Some(csv.clone());
        }
        Ok(Some(csv))
    }

    /// Wait for `AtLatestKnown` and return the installed CSV.
    pub async fn find_installed_csv(&mut self, scope: &TestScope) -> Result<String> {
        if let Err(err) = scope.wait_for(&self.at_latest_known()).await {
            return Err(err.with_diagnostics(self.diagnose(scope).await));
        }
        self.refresh(scope).await?.ok_or_else(|| Error::Missing {
            resource: self.resource_ref(),
            what: "installedCSV".to_string(),
        })
    }

    /// Wait until `csv` is the installed CSV.
    pub async fn expect_csv(&mut self, scope: &TestScope, csv: &str) -> Result<()> {
        let condition = Condition::equals(self.field("status.installedCSV"), csv)
            .every(Duration::from_secs(3))
            .within(Duration::from_secs(480))
            .described(format!("sub {} did not install {csv}", self.name));
        if let Err(err) = scope.wait_for(&condition).await {
            return Err(err.with_diagnostics(self.diagnose(scope).await));
        }
        self.refresh(scope).await?;
        Ok(())
    }

    /// The install plan the subscription currently references.
    pub async fn install_plan(&self, scope: &TestScope) -> Result<InstallPlanRef> {
        let condition = Condition::present(self.field("status.installPlanRef.name"))
            .every(Duration::from_secs(5))
            .within(Duration::from_secs(180))
            .described(format!("sub {} has no install plan", self.name));
        let observed = scope.wait_for(&condition).await?;
        let name = observed.text().ok_or_else(|| Error::Missing {
            resource: self.resource_ref(),
            what: "installPlanRef".to_string(),
        })?;
        Ok(InstallPlanRef::new(name, &self.namespace))
    }

    /// Approve every install plan OLM generates until the subscription is
    /// at the latest known version, then return the installed CSV.
    pub async fn approve(&mut self, scope: &TestScope) -> Result<String> {
        let sub = &*self;
        let outcome = Poller::new()
            .with_timeout(Duration::from_secs(360))
            .with_interval(Duration::from_secs(6))
            .with_error_message(format!("sub {} did not reach {AT_LATEST_KNOWN}", self.name))
            .poll_async(move || async move {
                let Some(current) = sub.observe(scope).await.map_err(|e| e.to_string())? else {
                    return Err(format!("sub {} does not exist", sub.name));
                };
                if current.state() == Some(AT_LATEST_KNOWN) {
                    return Ok(());
                }
                let Some(plan) = current.install_plan_name() else {
                    return Err(format!("no install plan yet, state {:?}", current.state()));
                };
                let plan = InstallPlanRef::new(plan, &sub.namespace);
                plan.approve(scope).await.map_err(|e| e.to_string())?;
                Err(format!("approved {}, state {:?}", plan.name, current.state()))
            })
            .await;

        if let Err(err) = outcome {
            return Err(Error::AssertionTimeout {
                description: err.message,
                expected: format!("state {AT_LATEST_KNOWN}"),
                last_observed: err.last.unwrap_or_default(),
                diagnostics: Some(self.diagnose(scope).await),
            });
        }
        self.find_installed_csv(scope).await
    }

    /// Approve the plan that installs `csv` and wait for it to reach
    /// `phase`. Does nothing when the subscription never asks for approval.
    pub async fn approve_specific_install_plan(
        &self,
        scope: &TestScope,
        csv: &str,
        phase: &str,
    ) -> Result<()> {
        let pending = self
            .state_is(UPGRADE_PENDING)
            .every(Duration::from_secs(3))
            .within(Duration::from_secs(120));
        if scope.wait_for(&pending).await.is_err() {
            info!("sub {} is not waiting for approval", self.name);
            return Ok(());
        }

        let namespace = self.namespace.as_str();
        let plan = Poller::new()
            .with_timeout(Duration::from_secs(90))
            .with_interval(Duration::from_secs(10))
            .with_error_message(format!("no install plan in {namespace} installs {csv}"))
            .poll_async(move || async move {
                let output = scope
                    .run(
                        Invocation::new("get")
                            .args(["installplan", "-o", "json"])
                            .namespace(namespace),
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                let plans: InstallPlanList =
                    serde_json::from_str(&output).map_err(|e| e.to_string())?;
                plans
                    .items
                    .iter()
                    .find(|plan| {
                        plan.spec
                            .cluster_service_version_names
                            .as_ref()
                            .is_some_and(|names| names.iter().any(|n| n == csv))
                    })
                    .and_then(|plan| plan.metadata.name.clone())
                    .ok_or_else(|| format!("{csv} not planned yet"))
            })
            .await
            .map_err(|err| Error::AssertionTimeout {
                description: err.message,
                expected: format!("an install plan for {csv}"),
                last_observed: err.last.unwrap_or_default(),
                diagnostics: None,
            })?;

        InstallPlanRef::new(plan, namespace)
            .approve_until(scope, phase)
            .await
    }

    /// Delete the installed CSV, which OLM does not remove with the
    /// subscription.
    pub async fn delete_csv(&mut self, scope: &TestScope) -> Result<()> {
        match self.csv() {
            Some(csv) => {
                csv.delete(scope).await?;
                self.installed_csv = None;
            }
            None => warn!("sub {} has no installed CSV to delete", self.name),
        }
        Ok(())
    }

    async fn diagnose(&self, scope: &TestScope) -> String {
        let mut report = scope
            .collect_diagnostics(Some(&self.namespace), Some(&self.resource_ref()))
            .await;
        if let Ok(Some(current)) = self.observe(scope).await {
            if let Some(message) = current.condition_message(RESOLUTION_FAILED) {
                report.push_str(&format!("{RESOLUTION_FAILED}: {message}\n"));
            }
            if let Some(current_csv) = current.current_csv() {
                if current.installed_csv() != Some(current_csv) {
                    report.push_str(&format!("currentCSV {current_csv} is not installed yet\n"));
                }
            }
        }
        if !self.source_namespace.is_empty() && self.source_namespace != self.namespace {
            report.push_str(&scope.collect_diagnostics(Some(&self.source_namespace), None).await);
        }
        report
    }
}

impl ClusterResource for Subscription {
    fn kind(&self) -> &str {
        "sub"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

impl Creatable for Subscription {
    fn creation(&self) -> Creation {
        let mut parameters = vec![
            ("SUBNAME", self.name.clone()),
            ("SUBNAMESPACE", self.namespace.clone()),
            ("CHANNEL", self.channel.clone()),
            ("APPROVAL", self.approval.as_str().to_string()),
            ("OPERATORNAME", self.package.clone()),
            ("SOURCENAME", self.source.clone()),
            ("SOURCENAMESPACE", self.source_namespace.clone()),
            ("STARTINGCSV", self.starting_csv.clone()),
            ("CONFIGMAPREF", self.config_map_ref.clone()),
            ("SECRETREF", self.secret_ref.clone()),
        ];
        if let Some(proxy) = &self.proxy {
            parameters.extend([
                ("SUBHTTPPROXY", proxy.http.clone()),
                ("SUBHTTPSPROXY", proxy.https.clone()),
                ("SUBNOPROXY", proxy.no_proxy.clone()),
            ]);
        }
        Creation::Template {
            template: self.template.clone(),
            parameters,
        }
    }

    fn readiness(&self) -> Vec<Condition> {
        match self.approval {
            Approval::Automatic => vec![self.at_latest_known()],
            Approval::Manual => vec![self.state_is(UPGRADE_PENDING)],
        }
    }

    async fn verify(&mut self, scope: &TestScope) -> Result<()> {
        match self.approval {
            Approval::Automatic => self.find_installed_csv(scope).await.map(|_| ()),
            Approval::Manual => verify_readiness(&*self, scope, self.readiness()).await,
        }
    }
}
