//! Construct paths and the logical identifiers derived from them.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Path component dropped entirely from id derivation.
const HIDDEN_ID: &str = "Default";
/// Path component kept in the hash but hidden from the readable prefix.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const MAX_HUMAN_LEN: usize = 240;
const MAX_ID_LEN: usize = 255;
const HASH_LEN: usize = 8;

/// Position of a construct inside its stack, e.g. `AppBuildRole/DefaultPolicy/Resource`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructPath(Vec<String>);

impl ConstructPath {
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(components.into_iter().map(Into::into).collect())
    }

    /// Path of the primary resource of a top-level construct (`<id>/Resource`).
    pub fn resource(id: &str) -> Self {
        Self::new([id, HIDDEN_FROM_HUMAN_ID])
    }

    /// Append a component.
    pub fn child(&self, id: &str) -> Self {
        let mut components = self.0.clone();
        components.push(id.to_string());
        Self(components)
    }

    /// The construct owning this resource (path without a trailing `Resource`).
    pub fn scope(&self) -> Self {
        match self.0.split_last() {
            Some((last, rest)) if last == HIDDEN_FROM_HUMAN_ID => Self(rest.to_vec()),
            _ => self.clone(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// The identifier a resource carries inside a synthesized template.
///
/// Derived from the construct path only, so synthesizing the same
/// declaration twice always yields the same ids.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct LogicalId(String);

impl LogicalId {
    /// Derive the logical id for a construct path.
    pub fn from_path(path: &ConstructPath) -> Result<Self> {
        make_unique_id(path.components()).map(Self)
    }

    /// Wrap an id read back from a template.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn make_unique_id(components: &[String]) -> Result<String> {
    let components: Vec<&str> = components
        .iter()
        .map(String::as_str)
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return Err(Error::InvalidInput(
            "unable to derive a logical id from an empty construct path".to_string(),
        ));
    }

    if let [single] = components.as_slice() {
        let candidate = remove_non_alphanumeric(single);
        if !candidate.is_empty() && candidate.len() <= MAX_ID_LEN {
            return Ok(candidate);
        }
    }

    let hash = path_hash(&components);
    let human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect::<String>()
        .chars()
        .take(MAX_HUMAN_LEN)
        .collect();

    Ok(format!("{human}{hash}"))
}

fn path_hash(components: &[&str]) -> String {
    let digest = md5::compute(components.join("/").as_bytes());
    format!("{:x}", digest)[..HASH_LEN].to_uppercase()
}

/// Drop consecutive duplicates (`Repo/Repo/Resource` reads as `Repo`).
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::with_capacity(components.len());
    for c in components {
        if out.last() != Some(c) {
            out.push(*c);
        }
    }
    out
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
