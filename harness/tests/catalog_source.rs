// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
//
// SPDX-License-Identifier: MIT

mod common;

use crate::common::fixture;
use harness::mock_cli::{MockCli, target_of};
use harness::resources::{Approval, CatalogSource, Creation, OperatorGroup, Project, Subscription};
use harness::{ClusterResource, Condition, Creatable, RawOutput, ResourceRef};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A tiny stand-in for the API server: `apply` creates whatever the last
/// `process` was asked to render, `get` reports it, `delete` removes it.
/// Catalog sources report READY on the third read.
#[derive(Clone, Default)]
struct FakeCluster {
    objects: Arc<Mutex<HashMap<(String, String), u32>>>,
    rendered: Arc<Mutex<Option<(String, String)>>>,
}

impl FakeCluster {
    fn mock(&self) -> MockCli {
        let cluster = self.clone();
        MockCli::new(move |inv| cluster.respond(inv))
    }

    fn respond(&self, inv: &harness::Invocation) -> RawOutput {
        let mut objects = self.objects.lock().unwrap();
        match inv.verb.as_str() {
            "process" => {
                let param = |key: &str| {
                    inv.args
                        .iter()
                        .find_map(|a| a.strip_prefix(&format!("{key}=")).map(str::to_string))
                        .unwrap_or_default()
                };
                *self.rendered.lock().unwrap() = Some((param("NAME"), param("NAMESPACE")));
                RawOutput::ok("{}")
            }
            "apply" => match self.rendered.lock().unwrap().take() {
                Some(key) => {
                    objects.insert(key, 0);
                    RawOutput::ok("catalogsource.operators.coreos.com/cs-1 created")
                }
                None => RawOutput::failed(1, "error: no objects passed to apply"),
            },
            "delete" => {
                let key = key_of(inv);
                match objects.remove(&key) {
                    Some(_) => RawOutput::ok(format!("{} deleted", key.0)),
                    None => RawOutput::empty(),
                }
            }
            "get" => {
                let (name, namespace) = key_of(inv);
                match objects.get_mut(&(name.clone(), namespace.clone())) {
                    Some(reads) => {
                        *reads += 1;
                        let state = if *reads >= 3 { "READY" } else { "CONNECTING" };
                        RawOutput::ok(
                            json!({
                                "apiVersion": "operators.coreos.com/v1alpha1",
                                "kind": "CatalogSource",
                                "metadata": {"name": name, "namespace": namespace},
                                "spec": {"sourceType": "grpc"},
                                "status": {"connectionState": {"lastObservedState": state}}
                            })
                            .to_string(),
                        )
                    }
                    None => RawOutput::empty(),
                }
            }
            _ => RawOutput::failed(1, format!("unexpected command: {inv}")),
        }
    }
}

fn key_of(inv: &harness::Invocation) -> (String, String) {
    let name = target_of(inv).map(|(_, name)| name).unwrap_or_default();
    let namespace = inv
        .args
        .iter()
        .skip_while(|a| *a != "-n")
        .nth(1)
        .cloned()
        .unwrap_or_default();
    (name.to_string(), namespace)
}

mock_test! {
async fn catalog_source_ready_then_deleted() -> anyhow::Result<()> {
    let cluster = FakeCluster::default();
    let mock = cluster.mock();
    let ctx = setup!(&mock);

    ctx.run(|scope| async move {
        let index = "quay.io/olmqe/learn-operator-index:v25";
        let mut catsrc = CatalogSource::new("cs-1", "ns-1", index, "cs-image.yaml");
        let created = catsrc.create_and_verify(&scope).await?;
        assert_eq!(catsrc.fetch_identity(&scope).await?, Some(created.clone()));

        catsrc.delete(&scope).await?;
        scope
            .wait_for(&Condition::absent(catsrc.query()).within(Duration::from_secs(30)))
            .await?;
        assert!(scope.owned().is_empty());
        Ok(())
    })
    .await?;

    // explicit delete plus nothing left for the unwind
    assert_eq!(mock.count(|inv| inv.verb == "delete"), 1);
    Ok(())
}
}

mock_test! {
async fn incomplete_identity_never_reaches_the_cluster() -> anyhow::Result<()> {
    let mock = FakeCluster::default().mock();
    let ctx = setup!(&mock);
    let scope = ctx.scope();

    let err = CatalogSource::new("cs-1", "", "quay.io/olmqe/index:v1", "cs-image.yaml")
        .create(&scope)
        .await
        .unwrap_err();

    assert!(matches!(err, harness::Error::IncompleteIdentity { missing: "namespace", .. }));
    assert!(mock.invocations().is_empty());
    assert!(scope.owned().is_empty());
    Ok(())
}
}

mock_test! {
async fn catalog_that_never_connects_times_out_with_diagnostics() -> anyhow::Result<()> {
    let mock = MockCli::new(|inv| match (inv.verb.as_str(), target_of(inv)) {
        ("get", Some(("catsrc", _))) => RawOutput::ok(
            json!({"status": {"connectionState": {"lastObservedState": "TRANSIENT_FAILURE"}}})
                .to_string(),
        ),
        ("get", _) => RawOutput::ok("cs-1-abcde   0/1   ImagePullBackOff"),
        ("describe", _) => RawOutput::ok("Events: Back-off pulling image"),
        _ => RawOutput::ok(""),
    });
    let ctx = setup!(&mock);
    let scope = ctx.scope();
    let mut catsrc =
        CatalogSource::new("cs-1", "ns-1", "quay.io/olmqe/missing:v1", "cs-image.yaml");

    let err = catsrc.create_and_verify(&scope).await.unwrap_err();
    match &err {
        harness::Error::AssertionTimeout { last_observed, diagnostics, .. } => {
            assert_eq!(last_observed, "TRANSIENT_FAILURE");
            let diagnostics = diagnostics.as_deref().unwrap_or_default();
            assert!(diagnostics.contains("Back-off pulling image"));
            assert!(diagnostics.contains("ImagePullBackOff"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // created before the check failed, so still owned
    assert_eq!(scope.owned(), vec![ResourceRef::namespaced("catsrc", "cs-1", "ns-1")]);
    Ok(())
}
}

#[test]
fn subscription_is_configured_by_the_scenario() -> anyhow::Result<()> {
    let sub = Subscription::new("learn", "ns-1", "learn", "olm-subscription.yaml")
        .with_channel("beta")
        .with_source("cs-1", "openshift-marketplace")
        .with_approval(Approval::Manual)
        .with_starting_csv("learn.v0.0.1");

    let Creation::Template { parameters, .. } = sub.creation() else {
        anyhow::bail!("subscriptions are created from a template");
    };
    for expected in [
        ("CHANNEL", "beta"),
        ("APPROVAL", "Manual"),
        ("SOURCENAME", "cs-1"),
        ("SOURCENAMESPACE", "openshift-marketplace"),
        ("STARTINGCSV", "learn.v0.0.1"),
    ] {
        assert!(
            parameters.contains(&(expected.0, expected.1.to_string())),
            "missing {expected:?}"
        );
    }
    assert_eq!(sub.installed_csv(), None);
    Ok(())
}

cluster_test! {
async fn install_operator_from_catalog() -> anyhow::Result<()> {
    let ctx = setup!();
    let index = std::env::var("OLM_E2E_INDEX_IMAGE")
        .unwrap_or_else(|_| "quay.io/olmqe/learn-operator-index:v25".to_string());

    ctx.run(|scope| async move {
        let namespace = harness::unique_name("olm-e2e");
        Project::new(&namespace).create_and_verify(&scope).await?;

        let mut catsrc = CatalogSource {
            display_name: "Test Operators".to_string(),
            publisher: "OLM QE".to_string(),
            ..CatalogSource::new("cs-1", &namespace, &index, fixture("cs-image-template.yaml"))
        };
        catsrc.create_and_verify(&scope).await?;
        catsrc.ensure_restricted_security_context(&scope).await?;

        OperatorGroup::new("og-1", &namespace, fixture("operatorgroup.yaml"))
            .create_if_absent(&scope)
            .await?;

        let template = fixture("olm-subscription.yaml");
        let mut sub = Subscription::new("learn", &namespace, "learn", template)
            .with_channel("beta")
            .with_source("cs-1", &namespace);
        match sub.create_and_verify(&scope).await {
            Err(e) if e.is_environmental() => {
                test_info!(TEST_NAME, "stopping early, the cluster is unhealthy: {e}");
                return Ok(());
            }
            created => created?,
        };
        let csv = sub.csv().ok_or_else(|| anyhow::anyhow!("no CSV resolved"))?;
        csv.wait_for_phase(&scope, crds::conditions::CSV_SUCCEEDED).await?;

        catsrc.delete(&scope).await?;
        scope
            .wait_for(&Condition::absent(catsrc.query()).within(Duration::from_secs(180)))
            .await?;
        Ok(())
    })
    .await
}
}
