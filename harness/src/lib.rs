// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

//! Harness for end-to-end scenarios against an Operator Lifecycle Manager
//! control plane. Every cluster interaction goes through the command-line
//! client wrapped by [`Cli`]; resources created by a scenario are recorded in
//! an [`OwnershipRegistry`] and removed in reverse order when the scenario
//! ends, and eventual state is asserted with [`Condition`]s.

pub mod cli;
pub mod config;
pub mod mock_cli;
pub mod query;
pub mod registry;
pub mod resources;
pub mod scope;
pub mod timer;

pub use cli::{Cli, ExecError, Identity, Invocation, RawOutput};
pub use config::HarnessConfig;
pub use query::{Condition, FieldPath, Matcher, Observed, Query};
pub use registry::{CleanupReport, OwnershipRegistry, ResourceRef};
pub use resources::{ClusterResource, Creatable};
pub use scope::TestScope;
pub use timer::{PollError, Poller};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} {name:?} cannot be used before its {missing} is set")]
    IncompleteIdentity {
        kind: String,
        name: String,
        missing: &'static str,
    },

    #[error("failed to create {resource}: {reason}")]
    Creation {
        resource: ResourceRef,
        reason: String,
    },

    #[error(
        "{description}: expected {expected}, last observed {last_observed}{}",
        diagnostics_suffix(.diagnostics)
    )]
    AssertionTimeout {
        description: String,
        expected: String,
        last_observed: String,
        diagnostics: Option<String>,
    },

    #[error("failed to delete {resource}: {reason}")]
    Cleanup {
        resource: ResourceRef,
        reason: String,
    },

    #[error("{resource} has no {what}")]
    Missing { resource: ResourceRef, what: String },

    #[error("{resource} failed: {reason}")]
    Failed {
        resource: ResourceRef,
        reason: String,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to parse the output of `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn diagnostics_suffix(diagnostics: &Option<String>) -> String {
    match diagnostics {
        Some(d) if !d.trim().is_empty() => format!("\ndiagnostics:\n{d}"),
        _ => String::new(),
    }
}

/// Output that means the cluster or a shared catalog is unhealthy rather
/// than the scenario being wrong.
const ENVIRONMENTAL_FAILURES: &[&str] = &[
    "Unable to connect to the server",
    "rpc error: code = Unavailable",
    "error using catalogsource openshift-marketplace/",
];

impl Error {
    /// Whether the failure was caused by the environment. Scenarios may stop
    /// early instead of failing on these. Assertion timeouts are judged by
    /// their last observation and diagnostics.
    pub fn is_environmental(&self) -> bool {
        let text = self.to_string();
        ENVIRONMENTAL_FAILURES
            .iter()
            .any(|marker| text.contains(marker))
    }

    /// Attach opportunistically gathered cluster output to an assertion
    /// failure. Other errors are returned unchanged.
    pub fn with_diagnostics(self, collected: String) -> Self {
        match self {
            Error::AssertionTimeout {
                description,
                expected,
                last_observed,
                ..
            } => Error::AssertionTimeout {
                description,
                expected,
                last_observed,
                diagnostics: Some(collected),
            },
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Eight lowercase alphanumerics, enough to keep parallel scenarios apart.
pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", random_suffix())
}
