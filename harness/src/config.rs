// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct HarnessConfig {
    /// Cluster client binary
    #[arg(long = "cli", env = "OLM_E2E_CLI", default_value = "oc")]
    pub cli: String,

    /// Kubeconfig for commands run as cluster admin
    #[arg(long, env = "OLM_E2E_ADMIN_KUBECONFIG")]
    pub admin_kubeconfig: Option<PathBuf>,

    /// Kubeconfig for commands run as the unprivileged test user
    #[arg(long, env = "OLM_E2E_USER_KUBECONFIG")]
    pub user_kubeconfig: Option<PathBuf>,

    /// Directory for processed templates
    #[arg(long, env = "OLM_E2E_OUTPUT_DIR", default_value_os_t = std::env::temp_dir())]
    pub output_dir: PathBuf,

    #[arg(long, env = "OLM_E2E_DELETE_INTERVAL_SECS", default_value_t = 4)]
    pub delete_interval_secs: u64,

    #[arg(long, env = "OLM_E2E_DELETE_TIMEOUT_SECS", default_value_t = 160)]
    pub delete_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cli: "oc".to_string(),
            admin_kubeconfig: None,
            user_kubeconfig: None,
            output_dir: std::env::temp_dir(),
            delete_interval_secs: 4,
            delete_timeout_secs: 160,
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `OLM_E2E_*` environment variables only.
    pub fn from_env() -> Self {
        Self::parse_from(["olm-e2e"])
    }

    pub fn delete_interval(&self) -> Duration {
        Duration::from_secs(self.delete_interval_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn client(&self) -> Cli {
        Cli::from_config(self)
    }
}
