//! Authorization audit.
//!
//! Constructs record the actions their principals invoke at runtime as
//! [`Requirement`]s. The audit checks each one against the statements
//! attached to that principal. A requirement with no matching Allow, or
//! with a matching Deny, would fail at runtime with access denied; the
//! audit surfaces it before anything is provisioned.

use regex::Regex;

use crate::iam::{Effect, PolicyStatement};
use crate::id::LogicalId;
use crate::reference::{Reference, Segment};

/// Actions a principal invokes against a resource at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub principal: LogicalId,
    /// Who needs the access, e.g. `pipeline source action Source`.
    pub purpose: String,
    pub actions: Vec<String>,
    pub resource: Reference,
}

impl Requirement {
    pub fn new<I, S>(principal: &LogicalId, purpose: impl Into<String>, actions: I, resource: Reference) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal: principal.clone(),
            purpose: purpose.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            resource,
        }
    }
}

/// A statement as attached to a principal through a policy resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedStatement {
    pub principal: LogicalId,
    pub policy: LogicalId,
    pub statement: PolicyStatement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGap {
    pub principal: LogicalId,
    pub purpose: String,
    pub action: String,
    pub resource: Reference,
    /// Policy holding the Deny statement, when the gap is an explicit deny.
    pub denied_by: Option<LogicalId>,
}

impl std::fmt::Display for AuthorizationGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.denied_by {
            Some(policy) => write!(
                f,
                "{} cannot {} on {} ({}): denied by {}",
                self.principal, self.action, self.resource, self.purpose, policy
            ),
            None => write!(
                f,
                "{} cannot {} on {} ({}): no statement allows it",
                self.principal, self.action, self.resource, self.purpose
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationReport {
    /// Number of (requirement, action) pairs checked.
    pub checked: usize,
    pub gaps: Vec<AuthorizationGap>,
}

impl AuthorizationReport {
    pub fn is_authorized(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn gaps_for(&self, principal: &LogicalId) -> Vec<&AuthorizationGap> {
        self.gaps.iter().filter(|g| &g.principal == principal).collect()
    }
}

/// Check every requirement against the statements attached to its principal.
pub fn audit(requirements: &[Requirement], attached: &[AttachedStatement]) -> AuthorizationReport {
    let mut report = AuthorizationReport::default();

    for requirement in requirements {
        let statements: Vec<&AttachedStatement> = attached
            .iter()
            .filter(|a| a.principal == requirement.principal)
            .collect();

        for action in &requirement.actions {
            report.checked += 1;

            let matching = |effect: Effect| {
                statements.iter().find(|a| {
                    a.statement.effect == effect
                        && statement_covers(&a.statement, action, &requirement.resource)
                })
            };

            let denied_by = matching(Effect::Deny).map(|a| a.policy.clone());
            if denied_by.is_some() || matching(Effect::Allow).is_none() {
                tracing::debug!(
                    principal = %requirement.principal,
                    %action,
                    resource = %requirement.resource,
                    "Authorization gap"
                );
                report.gaps.push(AuthorizationGap {
                    principal: requirement.principal.clone(),
                    purpose: requirement.purpose.clone(),
                    action: action.clone(),
                    resource: requirement.resource.clone(),
                    denied_by,
                });
            }
        }
    }

    report
}

pub fn statement_covers(statement: &PolicyStatement, action: &str, resource: &Reference) -> bool {
    statement.actions.iter().any(|p| action_matches(p, action))
        && statement.resources.iter().any(|p| resource_matches(p, resource))
}

/// IAM action match: `*` and `?` wildcards, case-insensitive.
pub fn action_matches(pattern: &str, action: &str) -> bool {
    glob_regex(pattern, ".*", ".", true)
        .map(|re| re.is_match(action))
        .unwrap_or(false)
}

/// Resource pattern match.
///
/// Both sides are flattened into literal text and tokens. Tokens (resource
/// attributes, pseudo parameters) must match one-for-one; wildcards in the
/// pattern's text never span a token. A bare `*` pattern matches anything.
/// A literal pattern therefore never matches a token-identified resource:
/// `arn:aws:s3:::artifact_bucket/*` does not authorize the bucket that
/// `${ArtifactBucket.Arn}` resolves to.
pub fn resource_matches(pattern: &Reference, resource: &Reference) -> bool {
    let pattern = pattern.segments();
    if let [Segment::Text(text)] = pattern.as_slice() {
        if text == "*" {
            return true;
        }
    }

    let mut expr = String::from("^");
    for segment in &pattern {
        match segment {
            Segment::Text(text) => expr.push_str(&glob_body(text, "[^\u{E000}]*", "[^\u{E000}]")),
            Segment::Token(token) => expr.push_str(&regex::escape(&encode_token(token))),
        }
    }
    expr.push('$');

    Regex::new(&expr)
        .map(|re| re.is_match(&encode(&resource.segments())))
        .unwrap_or(false)
}

fn encode(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => text.clone(),
            Segment::Token(token) => encode_token(token),
        })
        .collect()
}

fn encode_token(token: &Reference) -> String {
    format!("\u{E000}{}\u{E000}", token.to_json())
}

fn glob_body(pattern: &str, star: &str, question: &str) -> String {
    regex::escape(pattern)
        .replace(r"\*", star)
        .replace(r"\?", question)
}

fn glob_regex(pattern: &str, star: &str, question: &str, case_insensitive: bool) -> Option<Regex> {
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!("{}^{}$", flags, glob_body(pattern, star, question))).ok()
}
