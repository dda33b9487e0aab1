// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use env_logger::Env;
use log::info;

use harness::{Cli, Condition, HarnessConfig, Matcher, ResourceRef};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: HarnessConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll an object until it matches, failing after the timeout
    Wait(WaitArgs),
    /// Delete an object and wait until it is gone; missing objects are fine
    Delete(Target),
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Resource type, e.g. `catsrc` or `sub`
    kind: String,
    name: String,
    /// Omit for cluster-scoped kinds
    #[arg(short, long)]
    namespace: Option<String>,
}

impl Target {
    fn resource_ref(&self) -> ResourceRef {
        match &self.namespace {
            Some(ns) => ResourceRef::namespaced(&self.kind, &self.name, ns),
            None => ResourceRef::cluster(&self.kind, &self.name),
        }
    }
}

#[derive(clap::Args, Debug)]
#[command(group(
    ArgGroup::new("matcher")
        .required(true)
        .args(["equals", "contains", "present", "absent"])
))]
struct WaitArgs {
    #[command(flatten)]
    target: Target,

    /// Field of the JSON output, e.g. `status.connectionState.lastObservedState`
    #[arg(long)]
    field: Option<String>,

    #[arg(long)]
    equals: Option<String>,

    #[arg(long)]
    contains: Option<String>,

    #[arg(long)]
    present: bool,

    #[arg(long)]
    absent: bool,

    /// Seconds between attempts
    #[arg(long, default_value_t = 3)]
    interval: u64,

    /// Seconds before giving up
    #[arg(long, default_value_t = 150)]
    timeout: u64,
}

impl WaitArgs {
    fn condition(&self) -> Condition {
        let mut query = self.target.resource_ref().query();
        if let Some(field) = &self.field {
            query = query.field(field.as_str());
        }
        Condition::new(query, self.matcher())
            .every(Duration::from_secs(self.interval))
            .within(Duration::from_secs(self.timeout))
    }

    fn matcher(&self) -> Matcher {
        if let Some(value) = &self.equals {
            Matcher::Equals(value.clone())
        } else if let Some(value) = &self.contains {
            Matcher::Contains(value.clone())
        } else if self.absent {
            Matcher::Absent
        } else {
            Matcher::Present
        }
    }
}

async fn wait(cli: &Cli, args: &WaitArgs) -> Result<()> {
    let condition = args.condition();
    let observed = condition.wait(cli).await?;
    println!("{observed}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cli = Cli::from_config(&args.config);

    match &args.command {
        Command::Wait(wait_args) => wait(&cli, wait_args).await?,
        Command::Delete(target) => {
            let resource = target.resource_ref();
            resource.delete(&cli, &args.config).await?;
            info!("{resource} is gone");
        }
    }
    Ok(())
}
