// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
//
// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use harness::mock_cli::MockCli;
use harness::{Cli, HarnessConfig, OwnershipRegistry, TestScope, unique_name};
use std::path::PathBuf;
use std::sync::Once;

static INIT: Once = Once::new();

#[macro_export]
macro_rules! test_info {
    ($test_name:expr, $($arg:tt)*) => {{
        const GREEN: &str = "\x1b[32m";
        const RESET: &str = "\x1b[0m";
        println!("{}INFO{}: {}: {}", GREEN, RESET, $test_name, format!($($arg)*));
    }}
}

// mock_test runs with a paused clock so poll intervals pass instantly
#[macro_export]
macro_rules! mock_test {
    (async fn $name:ident() -> anyhow::Result<()> { $($body:tt)* }) => {
        #[tokio::test(start_paused = true)]
        async fn $name() -> anyhow::Result<()> {
            const TEST_NAME: &str = stringify!($name);
            $($body)*
        }
    };
}

// cluster_test labels the tests that need a live cluster
#[macro_export]
macro_rules! cluster_test {
    (async fn $name:ident() -> anyhow::Result<()> { $($body:tt)* }) => {
        #[tokio::test]
        #[ignore = "needs a cluster with OLM installed"]
        async fn $name() -> anyhow::Result<()> {
            const TEST_NAME: &str = stringify!($name);
            $($body)*
        }
    };
}

#[macro_export]
macro_rules! setup {
    () => {{ $crate::common::TestContext::new(TEST_NAME) }};
    ($mock:expr) => {{ $crate::common::TestContext::with_mock(TEST_NAME, $mock) }};
}

pub struct TestContext {
    test_name: String,
    test_id: String,
    cli: Cli,
    registry: OwnershipRegistry,
    config: HarnessConfig,
}

impl TestContext {
    /// Context for a live cluster, configured from `OLM_E2E_*`.
    pub fn new(test_name: &str) -> Self {
        let config = HarnessConfig::from_env();
        let cli = Cli::from_config(&config);
        Self::build(test_name, cli, config)
    }

    pub fn with_mock(test_name: &str, mock: &MockCli) -> Self {
        let config = HarnessConfig {
            delete_interval_secs: 1,
            delete_timeout_secs: 10,
            ..Default::default()
        };
        Self::build(test_name, mock.cli(), config)
    }

    fn build(test_name: &str, cli: Cli, config: HarnessConfig) -> Self {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        let ctx = Self {
            test_name: test_name.to_string(),
            test_id: unique_name(&test_name.replace('_', "-")),
            cli,
            registry: OwnershipRegistry::new(),
            config,
        };
        test_info!(&ctx.test_name, "Running as {}", ctx.test_id);
        ctx
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// A scope registered under this test's id.
    pub fn scope(&self) -> TestScope {
        TestScope::new(
            self.test_id.clone(),
            self.cli.clone(),
            self.registry.clone(),
            self.config.clone(),
        )
    }

    pub fn info(&self, message: impl std::fmt::Display) {
        test_info!(&self.test_name, "{}", message);
    }

    /// Run `body` with a fresh scope and unwind whatever it created.
    pub async fn run<F, Fut, T>(&self, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(TestScope) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.registry
            .run_scoped(&self.test_id, self.cli.clone(), self.config.clone(), body)
            .await
    }
}

/// Manifest templates live in `OLM_E2E_FIXTURES`, `testdata` by default.
pub fn fixture(name: &str) -> PathBuf {
    std::env::var_os("OLM_E2E_FIXTURES")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("testdata"))
        .join(name)
}
