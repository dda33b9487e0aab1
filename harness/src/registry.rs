// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cli::{Cli, Invocation};
use crate::config::HarnessConfig;
use crate::query::{Condition, Query};
use crate::{Error, Result};

/// Identity of one cluster object. `namespace` is `None` for cluster-scoped
/// kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    kind: String,
    name: String,
    namespace: Option<String>,
}

impl ResourceRef {
    pub fn namespaced(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `<kind> <name> [-n <namespace>]`
    pub fn target_args(&self) -> Vec<String> {
        let mut args = vec![self.kind.clone(), self.name.clone()];
        if let Some(ns) = &self.namespace {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        args
    }

    pub fn query(&self) -> Query {
        Query::get(self.target_args())
    }

    pub fn delete_invocation(&self) -> Invocation {
        Invocation::new("delete")
            .args(self.target_args())
            .arg("--ignore-not-found")
    }

    /// Delete the object and wait until it is gone. An object that is
    /// already missing counts as deleted.
    pub async fn delete(&self, cli: &Cli, config: &HarnessConfig) -> Result<()> {
        match cli.run(self.delete_invocation()).await {
            Ok(output) if output.trim().is_empty() => {
                debug!("{self} was already gone");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("{self} was already gone");
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Cleanup {
                    resource: self.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Condition::absent(self.query())
            .every(config.delete_interval())
            .within(config.delete_timeout())
            .described(format!("{self} still exists"))
            .wait(cli)
            .await
            .map_err(|e| Error::Cleanup {
                resource: self.clone(),
                reason: e.to_string(),
            })?;
        info!("Deleted {self}");
        Ok(())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, " in {ns}")?;
        }
        Ok(())
    }
}

/// Outcome of unwinding one test's resources.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<ResourceRef>,
    pub failed: Vec<(ResourceRef, Error)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Every resource the unwind tried to delete, in the order it tried.
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }
}

/// Records which resources each running test created.
///
/// Clones share state, so one registry can be handed to tests running in
/// parallel. The lock is only held for map updates, never across a
/// command.
#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    tests: Arc<Mutex<HashMap<String, Vec<ResourceRef>>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<ResourceRef>>> {
        self.tests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_test(&self, test_id: &str) {
        self.lock().entry(test_id.to_string()).or_default();
    }

    pub fn add(&self, test_id: &str, resource: ResourceRef) {
        let mut tests = self.lock();
        match tests.get_mut(test_id) {
            Some(refs) => refs.push(resource),
            None => {
                warn!("Test {test_id} was not registered before creating {resource}");
                tests.insert(test_id.to_string(), vec![resource]);
            }
        }
    }

    /// Forget the most recent registration of `resource`. Returns whether
    /// it was registered.
    pub fn remove(&self, test_id: &str, resource: &ResourceRef) -> bool {
        let mut tests = self.lock();
        let Some(refs) = tests.get_mut(test_id) else {
            return false;
        };
        match refs.iter().rposition(|r| r == resource) {
            Some(pos) => {
                refs.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn refs(&self, test_id: &str) -> Vec<ResourceRef> {
        self.lock().get(test_id).cloned().unwrap_or_default()
    }

    pub fn contains_test(&self, test_id: &str) -> bool {
        self.lock().contains_key(test_id)
    }

    pub fn is_owned(&self, test_id: &str, resource: &ResourceRef) -> bool {
        self.lock()
            .get(test_id)
            .is_some_and(|refs| refs.contains(resource))
    }

    fn pop(&self, test_id: &str) -> Option<ResourceRef> {
        self.lock().get_mut(test_id)?.pop()
    }

    /// Delete everything `test_id` registered, newest first, then forget the
    /// test. Failures are logged and reported, never returned.
    pub async fn cleanup(
        &self,
        test_id: &str,
        cli: &Cli,
        config: &HarnessConfig,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        while let Some(resource) = self.pop(test_id) {
            match resource.delete(cli, config).await {
                Ok(()) => report.deleted.push(resource),
                Err(e) => {
                    error!("Cleanup of {test_id}: {e}");
                    report.failed.push((resource, e));
                }
            }
        }
        self.lock().remove(test_id);

        if report.is_clean() {
            info!(
                "Cleaned up {} resources of {test_id}",
                report.deleted.len()
            );
        } else {
            warn!(
                "Cleanup of {test_id} left {} of {} resources behind",
                report.failed.len(),
                report.attempted()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RawOutput;
    use std::sync::Mutex as StdMutex;

    fn catsrc(name: &str) -> ResourceRef {
        ResourceRef::namespaced("catsrc", name, "ns-1")
    }

    #[test]
    fn add_keeps_creation_order() {
        let registry = OwnershipRegistry::new();
        registry.add_test("t1");
        registry.add_test("t1");
        registry.add("t1", catsrc("a"));
        registry.add("t1", catsrc("b"));
        registry.add("t1", ResourceRef::cluster("project", "ns-1"));

        assert_eq!(
            registry.refs("t1"),
            vec![catsrc("a"), catsrc("b"), ResourceRef::cluster("project", "ns-1")]
        );
        assert!(registry.is_owned("t1", &catsrc("b")));
        assert!(!registry.is_owned("t2", &catsrc("b")));
    }

    #[test]
    fn add_without_add_test_still_tracks() {
        let registry = OwnershipRegistry::new();
        registry.add("late", catsrc("a"));
        assert!(registry.contains_test("late"));
        assert_eq!(registry.refs("late"), vec![catsrc("a")]);
    }

    #[test]
    fn remove_forgets_one_entry() {
        let registry = OwnershipRegistry::new();
        registry.add_test("t1");
        registry.add("t1", catsrc("a"));
        registry.add("t1", catsrc("b"));

        assert!(registry.remove("t1", &catsrc("a")));
        assert!(!registry.remove("t1", &catsrc("a")));
        assert!(!registry.remove("unknown", &catsrc("b")));
        assert_eq!(registry.refs("t1"), vec![catsrc("b")]);
    }

    #[test]
    fn display_and_args() {
        let r = ResourceRef::namespaced("sub", "learn", "ns-1");
        assert_eq!(r.to_string(), "sub/learn in ns-1");
        assert_eq!(
            r.delete_invocation().argv(),
            vec!["delete", "sub", "learn", "-n", "ns-1", "--ignore-not-found"]
        );
        assert_eq!(ResourceRef::cluster("crd", "x.example.com").to_string(), "crd/x.example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_gone() {
        let gets = std::sync::Arc::new(StdMutex::new(0));
        let cli = {
            let gets = gets.clone();
            Cli::with_runner(move |inv: Invocation| {
                let gets = gets.clone();
                async move {
                    match inv.verb.as_str() {
                        "delete" => Ok(RawOutput::ok(
                            "subscription.operators.coreos.com \"learn\" deleted",
                        )),
                        _ => {
                            let mut n = gets.lock().unwrap();
                            *n += 1;
                            if *n < 3 {
                                Ok(RawOutput::ok("learn   2m"))
                            } else {
                                Ok(RawOutput::empty())
                            }
                        }
                    }
                }
            })
        };

        ResourceRef::namespaced("sub", "learn", "ns-1")
            .delete(&cli, &HarnessConfig::default())
            .await
            .unwrap();
        assert_eq!(*gets.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_rejects_real_errors() {
        let cli = Cli::with_runner(|_inv| async {
            Ok(RawOutput::failed(1, "Error from server (Forbidden): cannot delete"))
        });
        let err = catsrc("a")
            .delete(&cli, &HarnessConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cleanup { .. }));
    }
}
