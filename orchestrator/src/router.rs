//! Routing decisions
//!
//! A router looks at the history and the member set and names the next worker
//! or the finish keyword. It never touches the state: any explanation it wants
//! surfaced travels in [`Decision::rationale`] and is appended by the engine.
//!
//! Raw decisions are plain strings; the engine resolves them through
//! [`Members::resolve`](crate::state::Members::resolve) before dispatch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompts::render_supervisor_prompt;
use crate::state::{Members, Message};

/// A single routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Worker name or finish keyword
    pub next: String,

    /// Optional explanation, appended to the history as a router message
    #[serde(default, alias = "reason", skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Decision {
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            next: next.into(),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Decision component consulted by the engine between steps
#[async_trait]
pub trait Router: Send + Sync {
    async fn decide(&self, history: &[Message], members: &Members) -> Result<Decision>;
}

/// Follows a fixed plan of worker names
///
/// The position in the plan is the number of messages members have authored so
/// far, so each planned worker is expected to append exactly one message. When
/// the plan is exhausted the router finishes.
#[derive(Debug, Clone, Default)]
pub struct SequenceRouter {
    plan: Vec<String>,
}

impl SequenceRouter {
    pub fn new<I, S>(plan: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plan: plan.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Router for SequenceRouter {
    async fn decide(&self, history: &[Message], members: &Members) -> Result<Decision> {
        let completed = history
            .iter()
            .filter(|m| members.contains(m.producer()))
            .count();

        Ok(match self.plan.get(completed) {
            Some(next) => Decision::to(next.clone()),
            None => Decision::to(members.finish_keyword()),
        })
    }
}

type DecideFn = dyn Fn(&[Message], &Members) -> Result<Decision> + Send + Sync;

/// Router built from a synchronous closure
pub struct FnRouter {
    decide: Box<DecideFn>,
}

impl FnRouter {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&[Message], &Members) -> Result<Decision> + Send + Sync + 'static,
    {
        Self {
            decide: Box::new(decide),
        }
    }
}

#[async_trait]
impl Router for FnRouter {
    async fn decide(&self, history: &[Message], members: &Members) -> Result<Decision> {
        (self.decide)(history, members)
    }
}

/// External model that produces the supervisor's structured reply
#[async_trait]
pub trait DecisionModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, history: &[Message]) -> Result<String>;
}

/// Supervisor router backed by a [`DecisionModel`]
///
/// Renders the supervisor prompt for the current members, asks the model for a
/// `{"next": ..., "reason": ...}` reply and parses it.
pub struct ModelRouter<M> {
    model: M,
}

impl<M: DecisionModel> ModelRouter<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: DecisionModel> Router for ModelRouter<M> {
    async fn decide(&self, history: &[Message], members: &Members) -> Result<Decision> {
        let prompt = render_supervisor_prompt(members);
        tracing::debug!("Supervisor prompt: {}", prompt);

        let reply = self
            .model
            .complete(&prompt, history)
            .await
            .context("decision model call failed")?;
        tracing::debug!("Supervisor reply: {}", reply);

        parse_decision(&reply)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NextField {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawDecision {
    next: NextField,
    #[serde(default, alias = "rationale")]
    reason: Option<String>,
}

/// Parse a model reply into a [`Decision`]
///
/// Accepts a JSON object (optionally wrapped in prose or a code fence) whose
/// `next` is a string or a list (first entry wins), or a bare single word.
pub fn parse_decision(reply: &str) -> Result<Decision> {
    let trimmed = reply.trim();

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let raw: RawDecision = serde_json::from_str(&trimmed[start..=end])
                .with_context(|| format!("malformed routing reply: {}", trimmed))?;
            let next = match raw.next {
                NextField::One(next) => next,
                NextField::Many(list) => list
                    .into_iter()
                    .next()
                    .context("routing reply has an empty 'next' list")?,
            };
            return Ok(Decision {
                next,
                rationale: raw.reason.filter(|r| !r.trim().is_empty()),
            });
        }
    }

    let word = trimmed.trim_matches(|c: char| c == '"' || c == '`' || c == '.');
    if word.is_empty() || word.contains(char::is_whitespace) {
        anyhow::bail!("routing reply is not a decision: {}", trimmed);
    }
    Ok(Decision::to(word))
}
