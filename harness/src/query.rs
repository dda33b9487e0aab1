// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
// SPDX-FileCopyrightText: Jakob Naucke <jnaucke@redhat.com>
//
// SPDX-License-Identifier: MIT

//! Read-only queries and the assertions built on them.
//!
//! A [`Query`] is a command whose output is reduced to an [`Observed`]
//! value; a [`Condition`] re-issues it until a [`Matcher`] accepts the
//! observation or the condition's timeout expires.

use log::{debug, info};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::cli::{Cli, ExecError, Identity, Invocation};
use crate::timer::Poller;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    /// Select the first list element whose `key` renders as `value`.
    Filter { key: String, value: String },
}

/// Location of a field inside a JSON document.
///
/// Accepts dotted paths (`status.connectionState.lastObservedState`),
/// numeric indices (`items.0` or `items[0]`) and list filters
/// (`status.conditions[type=Ready].status`). The jsonpath wrapping used on
/// the command line (`{.status.phase}`) is stripped, and `\.` escapes a dot
/// inside a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        let raw = path.trim().to_string();
        let body = raw
            .strip_prefix('{')
            .and_then(|p| p.strip_suffix('}'))
            .unwrap_or(raw.as_str());
        let body = body.strip_prefix('.').unwrap_or(body);

        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        key.push(escaped);
                    }
                }
                '.' => push_key(&mut segments, &mut key),
                '[' => {
                    push_key(&mut segments, &mut key);
                    let inner: String = chars.by_ref().take_while(|&c| c != ']').collect();
                    segments.push(bracket_segment(&inner));
                }
                _ => key.push(c),
            }
        }
        push_key(&mut segments, &mut key);

        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn extract<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(document, |current, segment| match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(i) => current.get(*i),
                Segment::Filter { key, value } => current.as_array()?.iter().find(|item| {
                    item.get(key.as_str())
                        .is_some_and(|v| render(v) == *value)
                }),
            })
    }
}

fn push_key(segments: &mut Vec<Segment>, key: &mut String) {
    if key.is_empty() {
        return;
    }
    let key = std::mem::take(key);
    match key.parse::<usize>() {
        Ok(i) => segments.push(Segment::Index(i)),
        Err(_) => segments.push(Segment::Key(key)),
    }
}

fn bracket_segment(inner: &str) -> Segment {
    // `[?(@.type=="Ready")]` as well as `[type=Ready]`
    let inner = inner.trim();
    let inner = inner
        .strip_prefix("?(")
        .and_then(|i| i.strip_suffix(')'))
        .unwrap_or(inner);
    let inner = inner.strip_prefix("@.").unwrap_or(inner);

    if let Ok(i) = inner.parse::<usize>() {
        return Segment::Index(i);
    }
    match inner.split_once("==").or_else(|| inner.split_once('=')) {
        Some((key, value)) => Segment::Filter {
            key: key.trim().to_string(),
            value: value.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
        },
        None => Segment::Key(inner.trim_matches(|c| c == '"' || c == '\'').to_string()),
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Strings without quotes, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One observation made by a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// The object or field does not exist.
    Absent,
    Value(Value),
    /// Trimmed, non-empty text output of a query without a field path.
    Text(String),
    /// The command failed for a reason other than absence, or its output
    /// could not be parsed. Never matches anything.
    Failed(String),
}

impl Observed {
    pub fn text(&self) -> Option<String> {
        match self {
            Observed::Value(v) => Some(render(v)),
            Observed::Text(t) => Some(t.clone()),
            Observed::Absent | Observed::Failed(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Observed::Absent)
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Absent => f.write_str("<absent>"),
            Observed::Value(v) => f.write_str(&render(v)),
            Observed::Text(t) => f.write_str(t),
            Observed::Failed(e) => write!(f, "<query failed: {e}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Equals(String),
    Contains(String),
    AnyOf(Vec<String>),
    Present,
    Absent,
}

impl Matcher {
    pub fn matches(&self, observed: &Observed) -> bool {
        if let Observed::Failed(_) = observed {
            return false;
        }
        match self {
            Matcher::Present => !observed.is_absent(),
            Matcher::Absent => observed.is_absent(),
            Matcher::Equals(expected) => observed.text().is_some_and(|t| t == *expected),
            Matcher::AnyOf(candidates) => observed
                .text()
                .is_some_and(|t| candidates.iter().any(|c| *c == t)),
            Matcher::Contains(needle) => match observed {
                Observed::Value(Value::Array(items)) => {
                    items.iter().any(|item| render(item).contains(needle.as_str()))
                }
                other => other.text().is_some_and(|t| t.contains(needle.as_str())),
            },
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equals(v) => write!(f, "equal to {v:?}"),
            Matcher::Contains(v) => write!(f, "containing {v:?}"),
            Matcher::AnyOf(vs) => write!(f, "one of {vs:?}"),
            Matcher::Present => f.write_str("present"),
            Matcher::Absent => f.write_str("absent"),
        }
    }
}

/// A read-only command, optionally narrowed to one field of its JSON output.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    verb: String,
    args: Vec<String>,
    identity: Identity,
    field: Option<FieldPath>,
    /// Read stdout even when the command exits non-zero.
    answers_on_failure: bool,
}

impl Query {
    pub fn get<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::command("get", args)
    }

    pub fn command<I, S>(verb: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verb: verb.into(),
            args: args.into_iter().map(Into::into).collect(),
            identity: Identity::Admin,
            field: None,
            answers_on_failure: false,
        }
    }

    pub fn field(mut self, path: impl Into<FieldPath>) -> Self {
        self.field = Some(path.into());
        self
    }

    pub fn as_user(mut self) -> Self {
        self.identity = Identity::User;
        self
    }

    /// For commands like `auth can-i` that exit non-zero but still print
    /// their answer. A failure with empty stdout stays a failure.
    pub fn answers_on_failure(mut self) -> Self {
        self.answers_on_failure = true;
        self
    }

    /// `get` queries tolerate missing objects so that absence shows up as
    /// empty output; field queries ask for JSON.
    pub fn invocation(&self) -> Invocation {
        let mut invocation = Invocation::new(&self.verb)
            .args(self.args.iter().cloned())
            .identity(self.identity);
        if self.verb == "get" && !invocation.has_arg("--ignore-not-found") {
            invocation = invocation.arg("--ignore-not-found");
        }
        if self.field.is_some() && !invocation.has_arg("-o") {
            invocation = invocation.args(["-o", "json"]);
        }
        invocation
    }

    /// Run the query once. Never fails: problems become [`Observed::Failed`].
    pub async fn observe(&self, cli: &Cli) -> Observed {
        match cli.run(self.invocation()).await {
            Ok(output) => self.interpret(&output),
            Err(e) if e.is_not_found() => Observed::Absent,
            Err(ExecError::Failed { stdout, .. })
                if self.answers_on_failure && !stdout.trim().is_empty() =>
            {
                self.interpret(&stdout)
            }
            Err(e) => Observed::Failed(e.to_string()),
        }
    }

    pub fn interpret(&self, output: &str) -> Observed {
        let output = output.trim();
        if output.is_empty() {
            return Observed::Absent;
        }
        let Some(path) = &self.field else {
            return Observed::Text(output.to_string());
        };
        match serde_json::from_str::<Value>(output) {
            Ok(document) => match path.extract(&document) {
                None | Some(Value::Null) => Observed::Absent,
                Some(Value::String(s)) if s.is_empty() => Observed::Absent,
                Some(value) => Observed::Value(value.clone()),
            },
            Err(e) => Observed::Failed(format!("unparseable output: {e}")),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.args.join(" "))?;
        if let Some(field) = &self.field {
            write!(f, " ({field})")?;
        }
        Ok(())
    }
}

/// An expectation about eventual cluster state.
#[derive(Debug, Clone)]
pub struct Condition {
    pub query: Query,
    pub matcher: Matcher,
    /// `false` inverts the matcher. A failed query satisfies neither.
    pub expect: bool,
    pub interval: Duration,
    pub timeout: Duration,
    description: Option<String>,
}

impl Condition {
    pub fn new(query: Query, matcher: Matcher) -> Self {
        Self {
            query,
            matcher,
            expect: true,
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(150),
            description: None,
        }
    }

    pub fn equals(query: Query, value: impl Into<String>) -> Self {
        Self::new(query, Matcher::Equals(value.into()))
    }

    pub fn contains(query: Query, value: impl Into<String>) -> Self {
        Self::new(query, Matcher::Contains(value.into()))
    }

    pub fn any_of<I, S>(query: Query, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(query, Matcher::AnyOf(values.into_iter().map(Into::into).collect()))
    }

    pub fn present(query: Query) -> Self {
        Self::new(query, Matcher::Present)
    }

    pub fn absent(query: Query) -> Self {
        Self::new(query, Matcher::Absent)
    }

    pub fn negated(mut self) -> Self {
        self.expect = !self.expect;
        self
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("`{}` is not {}", self.query, self.expected()))
    }

    pub fn expected(&self) -> String {
        if self.expect {
            self.matcher.to_string()
        } else {
            format!("not {}", self.matcher)
        }
    }

    pub fn is_satisfied_by(&self, observed: &Observed) -> bool {
        match observed {
            Observed::Failed(_) => false,
            _ => self.matcher.matches(observed) == self.expect,
        }
    }

    /// Poll until satisfied and return the satisfying observation.
    pub async fn wait(&self, cli: &Cli) -> Result<Observed> {
        let poller = Poller::new()
            .with_timeout(self.timeout)
            .with_interval(self.interval)
            .with_error_message(self.description());

        let condition = self;
        let result = poller
            .poll_async(move || async move {
                let observed = condition.query.observe(cli).await;
                if condition.is_satisfied_by(&observed) {
                    Ok(observed)
                } else {
                    Err(observed)
                }
            })
            .await;

        match result {
            Ok(observed) => {
                info!("`{}` is {}: {observed}", self.query, self.expected());
                Ok(observed)
            }
            Err(err) => {
                debug!("{err}");
                Err(Error::AssertionTimeout {
                    description: err.message,
                    expected: self.expected(),
                    last_observed: err
                        .last
                        .map(|o| o.to_string())
                        .unwrap_or_else(|| "<nothing>".to_string()),
                    diagnostics: None,
                })
            }
        }
    }
}
