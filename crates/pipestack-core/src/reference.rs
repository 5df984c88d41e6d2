//! Typed references between declared resources.
//!
//! Handles hand out [`Reference`] values instead of strings, so a policy
//! statement or a pipeline binding always points at the canonical identity
//! of the resource it names. References render to template intrinsics
//! (`Ref`, `Fn::GetAtt`, `Fn::Join`).

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::id::LogicalId;

/// Values supplied by the provider at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
}

impl Pseudo {
    pub fn name(&self) -> &'static str {
        match self {
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Region => "AWS::Region",
            Pseudo::Partition => "AWS::Partition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Literal(String),
    Ref(LogicalId),
    GetAtt(LogicalId, String),
    Pseudo(Pseudo),
    Join(String, Vec<Reference>),
}

/// A flattened piece of a reference: literal text or an opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Token(Reference),
}

impl Reference {
    pub fn literal(value: impl Into<String>) -> Self {
        Reference::Literal(value.into())
    }

    pub fn get_att(id: &LogicalId, attribute: &str) -> Self {
        Reference::GetAtt(id.clone(), attribute.to_string())
    }

    /// Concatenate parts with no separator.
    pub fn concat(parts: impl IntoIterator<Item = Reference>) -> Self {
        Reference::Join(String::new(), parts.into_iter().collect())
    }

    /// The `*` pattern, matching every resource.
    pub fn any() -> Self {
        Reference::literal("*")
    }

    /// Logical ids this reference depends on.
    pub fn referenced_ids(&self) -> Vec<&LogicalId> {
        match self {
            Reference::Ref(id) | Reference::GetAtt(id, _) => vec![id],
            Reference::Join(_, parts) => parts.iter().flat_map(Reference::referenced_ids).collect(),
            Reference::Literal(_) | Reference::Pseudo(_) => Vec::new(),
        }
    }

    /// Flatten into literal text and tokens, merging adjacent text.
    pub fn segments(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        self.push_segments(&mut out);
        out
    }

    fn push_segments(&self, out: &mut Vec<Segment>) {
        match self {
            Reference::Literal(text) => push_text(out, text),
            Reference::Join(separator, parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        push_text(out, separator);
                    }
                    part.push_segments(out);
                }
            }
            token => out.push(Segment::Token(token.clone())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Reference::Literal(text) => Value::String(text.clone()),
            Reference::Ref(id) => json!({ "Ref": id }),
            Reference::Pseudo(p) => json!({ "Ref": p.name() }),
            Reference::GetAtt(id, attribute) => json!({ "Fn::GetAtt": [id, attribute] }),
            Reference::Join(separator, parts) => {
                let parts: Vec<Value> = parts.iter().map(Reference::to_json).collect();
                json!({ "Fn::Join": [separator, parts] })
            }
        }
    }
}

fn push_text(out: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Segment::Text(text.to_string()));
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Reference::literal(value)
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Reference::Literal(value)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Literal(text) => write!(f, "{}", text),
            Reference::Ref(id) => write!(f, "${{{}}}", id),
            Reference::Pseudo(p) => write!(f, "${{{}}}", p.name()),
            Reference::GetAtt(id, attribute) => write!(f, "${{{}.{}}}", id, attribute),
            Reference::Join(separator, parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", separator)?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}
