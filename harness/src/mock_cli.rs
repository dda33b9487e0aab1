// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

//! Scripted stand-in for the cluster client.

use std::sync::{Arc, Mutex, PoisonError};

use crate::cli::{Cli, Invocation, RawOutput};

type Responder = dyn Fn(&Invocation) -> RawOutput + Send + Sync;

/// Answers every invocation with `response_closure` and remembers what was
/// asked, in order.
#[derive(Clone)]
pub struct MockCli {
    response_closure: Arc<Responder>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl MockCli {
    pub fn new<F>(response_closure: F) -> Self
    where
        F: Fn(&Invocation) -> RawOutput + Send + Sync + 'static,
    {
        Self {
            response_closure: Arc::new(response_closure),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn cli(&self) -> Cli {
        let mock = self.clone();
        Cli::with_runner(move |invocation: Invocation| {
            let output = mock.respond(invocation);
            async move { Ok(output) }
        })
    }

    fn respond(&self, invocation: Invocation) -> RawOutput {
        let output = (self.response_closure)(&invocation);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation);
        output
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rendered command lines, e.g. `delete sub learn -n ns-1 --ignore-not-found`.
    pub fn commands(&self) -> Vec<String> {
        self.invocations().iter().map(ToString::to_string).collect()
    }

    pub fn count(&self, predicate: impl Fn(&Invocation) -> bool) -> usize {
        self.invocations().iter().filter(|inv| predicate(inv)).count()
    }
}

/// Fields of `args` that look like `<kind> <name>`, skipping flags.
pub fn target_of(invocation: &Invocation) -> Option<(&str, &str)> {
    let mut positional = invocation
        .args
        .iter()
        .scan(false, |skip_next, arg| {
            let skip = *skip_next;
            *skip_next = matches!(arg.as_str(), "-n" | "-o" | "-p" | "-f" | "--type");
            Some((skip, arg))
        })
        .filter(|(skip, arg)| !skip && !arg.starts_with('-'))
        .map(|(_, arg)| arg.as_str());
    Some((positional.next()?, positional.next()?))
}
