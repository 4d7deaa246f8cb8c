//! Shared state threaded through one graph execution
//!
//! The state carries:
//! - An append-only message history
//! - Free-form fields written by workers
//! - The member set frozen at build time
//! - The current routing target

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GraphError;

/// Producer name used for messages supplied by the caller
pub const USER: &str = "user";

/// Who a message is attributed to in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single entry in the conversation history
///
/// Messages have no mutable accessors; once appended they never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    producer: String,
    role: Role,
    content: String,
}

impl Message {
    pub fn new(producer: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            role,
            content: content.into(),
        }
    }

    /// A message from the caller
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER, Role::User, content)
    }

    /// A message authored by a worker or the router
    pub fn assistant(producer: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(producer, Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", Role::System, content)
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Where control goes after a step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Target {
    /// Hand control back to the router for a fresh decision
    Router,
    /// Dispatch the named worker next
    Worker(String),
    /// Stop; no further worker runs
    Finish,
}

impl Target {
    pub fn worker(name: impl Into<String>) -> Self {
        Self::Worker(name.into())
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Target::Finish)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Router => write!(f, "<router>"),
            Target::Worker(name) => write!(f, "{}", name),
            Target::Finish => write!(f, "<finish>"),
        }
    }
}

/// Reserved name for the graph's exit, accepted alongside the finish keyword
pub const END: &str = "__end__";

/// The frozen set of worker names a router may choose from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    names: BTreeSet<String>,
    #[serde(default)]
    router_name: String,
    #[serde(default)]
    finish_keyword: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    descriptions: BTreeMap<String, String>,
}

impl Members {
    pub(crate) fn new(
        names: impl IntoIterator<Item = String>,
        router_name: impl Into<String>,
        finish_keyword: impl Into<String>,
    ) -> Self {
        Self {
            names: names.into_iter().collect(),
            router_name: router_name.into(),
            finish_keyword: finish_keyword.into(),
            descriptions: BTreeMap::new(),
        }
    }

    /// Attach worker descriptions; blank ones and non-members are skipped
    pub(crate) fn with_descriptions(
        mut self,
        descriptions: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        for (name, description) in descriptions {
            let description = description.trim();
            if self.names.contains(&name) && !description.is_empty() {
                self.descriptions.insert(name, description.to_string());
            }
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Member names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Description registered for `name`, if any
    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }

    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    pub fn finish_keyword(&self) -> &str {
        &self.finish_keyword
    }

    /// Resolve a raw routing string into a validated [`Target`]
    ///
    /// The finish keyword (case-insensitive) and [`END`] map to
    /// [`Target::Finish`], the router's own name maps to [`Target::Router`], and
    /// member names map to [`Target::Worker`]. Anything else is an
    /// [`GraphError::InvalidRoute`].
    pub fn resolve(&self, raw: &str) -> Result<Target, GraphError> {
        let raw = raw.trim();
        let is_finish_keyword =
            !self.finish_keyword.is_empty() && raw.eq_ignore_ascii_case(&self.finish_keyword);
        if raw == END || is_finish_keyword {
            return Ok(Target::Finish);
        }
        if !self.router_name.is_empty() && raw == self.router_name {
            return Ok(Target::Router);
        }
        if self.contains(raw) {
            return Ok(Target::Worker(raw.to_string()));
        }
        Err(self.invalid(raw))
    }

    /// Check a target a worker constructed directly
    pub fn validate(&self, target: &Target) -> Result<(), GraphError> {
        match target {
            Target::Worker(name) if !self.contains(name) => Err(self.invalid(name)),
            _ => Ok(()),
        }
    }

    fn invalid(&self, target: &str) -> GraphError {
        GraphError::InvalidRoute {
            target: target.to_string(),
            members: self.to_vec(),
        }
    }
}

/// The mutable record for one top-level request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedState {
    history: Vec<Message>,
    fields: Map<String, Value>,
    members: Members,
    next_target: Option<Target>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state with a single user query
    pub fn from_query(query: impl Into<String>) -> Self {
        Self::new().with_message(Message::user(query))
    }

    /// Seed an initial message (builder style, before the run starts)
    pub fn with_message(mut self, message: Message) -> Self {
        self.history.push(message);
        self
    }

    /// Seed an initial field (builder style, before the run starts)
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn members(&self) -> &Members {
        &self.members
    }

    pub fn next_target(&self) -> Option<&Target> {
        self.next_target.as_ref()
    }

    pub(crate) fn set_members(&mut self, members: Members) {
        self.members = members;
    }

    pub(crate) fn set_next_target(&mut self, target: Target) {
        self.next_target = Some(target);
    }

    pub(crate) fn clear_next_target(&mut self) {
        self.next_target = None;
    }

    pub(crate) fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.history.extend(messages);
    }

    /// Shallow merge, last write wins per key
    pub(crate) fn merge_fields(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            self.fields.insert(key, value);
        }
    }
}
