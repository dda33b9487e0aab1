// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use crds::conditions::{CSV_FAILED, INSTALL_PLAN_COMPLETE, INSTALL_PLAN_FAILED};
use log::{debug, info};
use serde_json::json;
use std::time::Duration;

use super::ClusterResource;
use crate::query::{Condition, Matcher, Observed};
use crate::scope::TestScope;
use crate::{Error, Result};

/// Also accept `failed`, so a wait for `phase` ends as soon as the object
/// can no longer get there.
fn settled(mut condition: Condition, phase: &str, failed: &str) -> Condition {
    if phase != failed {
        condition.matcher = Matcher::AnyOf(vec![phase.to_string(), failed.to_string()]);
    }
    condition
}

/// An install plan OLM generated for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlanRef {
    pub name: String,
    pub namespace: String,
}

impl InstallPlanRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn phase_is(&self, phase: &str) -> Condition {
        Condition::equals(self.field("status.phase"), phase)
            .every(Duration::from_secs(10))
            .within(Duration::from_secs(70))
            .described(format!("installplan {} phase is not {phase}", self.name))
    }

    /// Wait for `phase`. A plan that fails first is reported right away.
    pub async fn wait_for_phase(&self, scope: &TestScope, phase: &str) -> Result<Observed> {
        let condition = settled(self.phase_is(phase), phase, INSTALL_PLAN_FAILED);
        let observed = scope.wait_for(&condition).await?;
        if observed.text().as_deref() == Some(phase) {
            return Ok(observed);
        }
        Err(Error::Failed {
            resource: self.resource_ref(),
            reason: format!("phase {INSTALL_PLAN_FAILED} while waiting for {phase}"),
        })
    }

    pub async fn observe(&self, scope: &TestScope) -> Result<Option<crds::InstallPlan>> {
        self.fetch(scope).await
    }

    /// Approve the plan and wait for OLM to finish executing it.
    pub async fn approve(&self, scope: &TestScope) -> Result<()> {
        self.approve_until(scope, INSTALL_PLAN_COMPLETE).await
    }

    /// Approve the plan unless it already is, then wait for `phase`.
    pub async fn approve_until(&self, scope: &TestScope, phase: &str) -> Result<()> {
        match self.observe(scope).await? {
            Some(plan) if plan.phase() == Some(INSTALL_PLAN_FAILED) => {
                return Err(Error::Failed {
                    resource: self.resource_ref(),
                    reason: format!("phase {INSTALL_PLAN_FAILED} before approval"),
                });
            }
            Some(plan) if plan.is_approved() => {
                debug!("installplan {} is already approved", self.name);
            }
            _ => {
                self.patch(scope, &json!({"spec": {"approved": true}})).await?;
                info!("Approved installplan {} in {}", self.name, self.namespace);
            }
        }
        self.wait_for_phase(scope, phase).await?;
        Ok(())
    }
}

impl ClusterResource for InstallPlanRef {
    fn kind(&self) -> &str {
        "installplan"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}

/// A ClusterServiceVersion installed on behalf of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRef {
    pub name: String,
    pub namespace: String,
}

impl CsvRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn phase_is(&self, phase: &str) -> Condition {
        Condition::equals(self.field("status.phase"), phase)
            .every(Duration::from_secs(3))
            .within(Duration::from_secs(360))
            .described(format!("csv {} phase is not {phase}", self.name))
    }

    /// Wait for `phase`. A CSV that fails first is reported right away
    /// with the reason OLM gives.
    pub async fn wait_for_phase(&self, scope: &TestScope, phase: &str) -> Result<Observed> {
        let condition = settled(self.phase_is(phase), phase, CSV_FAILED);
        let observed = scope.wait_for(&condition).await?;
        if observed.text().as_deref() == Some(phase) {
            return Ok(observed);
        }
        let reason = match self.observe(scope).await? {
            Some(csv) => format!(
                "phase {}: {}",
                csv.phase().unwrap_or(CSV_FAILED),
                csv.message().unwrap_or("no message")
            ),
            None => format!("phase {CSV_FAILED}, then deleted"),
        };
        Err(Error::Failed {
            resource: self.resource_ref(),
            reason,
        })
    }

    pub async fn observe(
        &self,
        scope: &TestScope,
    ) -> Result<Option<crds::ClusterServiceVersion>> {
        self.fetch(scope).await
    }
}

impl ClusterResource for CsvRef {
    fn kind(&self) -> &str {
        "csv"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
}
