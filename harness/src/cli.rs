// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use futures_util::future::{BoxFuture, FutureExt};
use log::debug;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use tokio::process::Command;

use crate::config::HarnessConfig;

/// Which kubeconfig a command runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Admin,
    User,
}

/// One command issued to the cluster client, e.g. `get sub learn -n ns-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verb: String,
    pub args: Vec<String>,
    pub namespace: Option<String>,
    pub identity: Identity,
    pub output_file: Option<PathBuf>,
}

impl Invocation {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
            namespace: None,
            identity: Identity::Admin,
            output_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn as_user(self) -> Self {
        self.identity(Identity::User)
    }

    pub fn output_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Arguments as passed after the client binary.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        argv.push(self.verb.clone());
        argv.extend(self.args.iter().cloned());
        if let Some(ns) = &self.namespace {
            argv.push("-n".to_string());
            argv.push(ns.clone());
        }
        argv
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))?;
        if self.identity == Identity::User {
            write!(f, " (as user)")?;
        }
        Ok(())
    }
}

/// What a runner reports back for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn empty() -> Self {
        Self::ok("")
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Output the client prints for a named object that does not exist.
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::failed(
            1,
            format!("Error from server (NotFound): {kind} \"{name}\" not found"),
        )
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("could not run `{command}`: {source}")]
    Invocation {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}: {}", status_text(.status), trimmed(.stderr))]
    Failed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("could not write the output of `{command}` to {path:?}: {source}")]
    Redirect {
        command: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn trimmed(text: &str) -> &str {
    text.trim()
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Whether client output reports that the addressed object does not exist.
pub fn reports_not_found(text: &str) -> bool {
    text.contains("NotFound") || text.contains("No resources found")
}

impl ExecError {
    /// True only for a command that ran and reported a missing object. A
    /// command that could not be run is never "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            ExecError::Failed { stdout, stderr, .. } => {
                reports_not_found(stderr) || reports_not_found(stdout)
            }
            _ => false,
        }
    }
}

type Runner = dyn Fn(Invocation) -> BoxFuture<'static, io::Result<RawOutput>> + Send + Sync;

/// Executes [`Invocation`]s. Cheap to clone; all clones share one runner.
#[derive(Clone)]
pub struct Cli {
    runner: Arc<Runner>,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli").finish_non_exhaustive()
    }
}

impl Cli {
    /// Spawn `binary` for every invocation, selecting the kubeconfig by
    /// identity. Without a kubeconfig the ambient `KUBECONFIG` applies.
    pub fn new(
        binary: impl Into<String>,
        admin_kubeconfig: Option<PathBuf>,
        user_kubeconfig: Option<PathBuf>,
    ) -> Self {
        let binary = binary.into();
        Self::with_runner(move |invocation: Invocation| {
            let kubeconfig = match invocation.identity {
                Identity::Admin => admin_kubeconfig.clone(),
                Identity::User => user_kubeconfig.clone(),
            };
            spawn(binary.clone(), kubeconfig, invocation)
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.cli.clone(),
            config.admin_kubeconfig.clone(),
            config.user_kubeconfig.clone(),
        )
    }

    pub fn with_runner<F, Fut>(runner: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<RawOutput>> + Send + 'static,
    {
        Self {
            runner: Arc::new(move |invocation| runner(invocation).boxed()),
        }
    }

    /// Run one command. Returns its stdout, or the path of the output file
    /// when the invocation redirects.
    pub async fn run(&self, invocation: Invocation) -> Result<String, ExecError> {
        let command = invocation.to_string();
        let output_file = invocation.output_file.clone();
        debug!("Running `{command}`");

        let raw = (self.runner)(invocation)
            .await
            .map_err(|source| ExecError::Invocation {
                command: command.clone(),
                source,
            })?;

        if !raw.success() {
            debug!("`{command}` failed: {}", raw.stderr.trim());
            return Err(ExecError::Failed {
                command,
                status: raw.status,
                stdout: raw.stdout,
                stderr: raw.stderr,
            });
        }

        match output_file {
            Some(path) => {
                write_output(&path, &raw.stdout)
                    .await
                    .map_err(|source| ExecError::Redirect {
                        command,
                        path: path.clone(),
                        source,
                    })?;
                Ok(path.display().to_string())
            }
            None => Ok(raw.stdout),
        }
    }
}

async fn write_output(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, contents.as_bytes()).await
}

async fn spawn(
    binary: String,
    kubeconfig: Option<PathBuf>,
    invocation: Invocation,
) -> io::Result<RawOutput> {
    let mut command = Command::new(&binary);
    if let Some(path) = kubeconfig {
        command.arg(format!("--kubeconfig={}", path.display()));
    }
    command.args(invocation.argv()).stdin(Stdio::null());

    let output = command.output().await?;
    Ok(RawOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
