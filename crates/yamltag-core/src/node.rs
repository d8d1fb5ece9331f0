//! Generic document tree
//!
//! Documents are parsed into `serde_yaml::Value` trees. A directive is a
//! `Value::Tagged` node; these helpers give the resolvers a uniform view of
//! kind, tag and scalar text.
//!
//! Anchors and aliases are expanded by the parser, so an aliased node shows
//! up here as a plain copy of the anchored node.

use std::fmt;

use serde::de::{
    self, DeserializeSeed, Deserializer, EnumAccess, IgnoredAny, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use serde::Deserialize;
use serde_yaml::value::{Mapping, TaggedValue};
use serde_yaml::Value;

use crate::error::{Error, Result};

/// A node of a parsed YAML document
pub type Node = Value;

/// Structural kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Sequence,
    Mapping,
}

/// Get the structural kind of a node, looking through any tag
pub fn kind(node: &Node) -> NodeKind {
    match node {
        Value::Sequence(_) => NodeKind::Sequence,
        Value::Mapping(_) => NodeKind::Mapping,
        Value::Tagged(tagged) => kind(&tagged.value),
        _ => NodeKind::Scalar,
    }
}

/// Get the tag of a node in its `!name` form
pub fn tag(node: &Node) -> Option<String> {
    match node {
        Value::Tagged(tagged) => Some(tagged.tag.to_string()),
        _ => None,
    }
}

/// Get the text of a scalar node (tagged or not).
///
/// Tagged scalars produced by [`parse`] are strings holding the source text,
/// which is returned verbatim. Typed scalars built some other way render
/// numbers and booleans in canonical form and null as the empty string.
/// Returns `None` for sequences and mappings.
pub fn scalar_text(node: &Node) -> Option<String> {
    match node {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Parse the first document of `input`, ignoring any that follow.
///
/// Untagged scalars are typed the usual way. A tagged scalar keeps the
/// text it was written with, as a string, so `!var 1.10` names `1.10` and
/// `!var null` names `null`.
pub fn parse(input: &[u8]) -> serde_yaml::Result<Node> {
    let typed = match serde_yaml::Deserializer::from_slice(input).next() {
        Some(document) => Value::deserialize(document)?,
        None => return Ok(Value::Null),
    };
    if !has_tags(&typed) {
        return Ok(typed);
    }

    // Second pass over the same events, reading tagged scalars as strings
    match serde_yaml::Deserializer::from_slice(input).next() {
        Some(document) => SourceText(&typed).deserialize(document),
        None => Ok(typed),
    }
}

fn has_tags(node: &Node) -> bool {
    match node {
        Value::Tagged(_) => true,
        Value::Sequence(seq) => seq.iter().any(has_tags),
        Value::Mapping(map) => map.iter().any(|(k, v)| has_tags(k) || has_tags(v)),
        _ => false,
    }
}

/// Rebuilds a typed tree from the event stream it was parsed from,
/// taking the raw text of every tagged scalar.
struct SourceText<'a>(&'a Node);

impl<'de> DeserializeSeed<'de> for SourceText<'_> {
    type Value = Node;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        match self.0 {
            node if !has_tags(node) => {
                IgnoredAny::deserialize(deserializer)?;
                Ok(node.clone())
            }
            Value::Sequence(_) => deserializer.deserialize_seq(self),
            Value::Mapping(_) => deserializer.deserialize_map(self),
            _ => deserializer.deserialize_any(self),
        }
    }
}

impl<'de> Visitor<'de> for SourceText<'_> {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", describe(self.0))
    }

    fn visit_enum<A>(self, data: A) -> std::result::Result<Node, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let Value::Tagged(tagged) = self.0 else {
            return Err(de::Error::invalid_type(de::Unexpected::Enum, &self));
        };
        let (_, content) = data.variant::<IgnoredAny>()?;
        let value = match &tagged.value {
            Value::Sequence(_) | Value::Mapping(_) => {
                content.newtype_variant_seed(SourceText(&tagged.value))?
            }
            _ => Value::String(content.newtype_variant::<String>()?),
        };
        Ok(Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag.clone(),
            value,
        })))
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Node, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let Value::Sequence(items) = self.0 else {
            return Err(de::Error::invalid_type(de::Unexpected::Seq, &self));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match seq.next_element_seed(SourceText(item))? {
                Some(value) => out.push(value),
                None => return Err(de::Error::invalid_length(out.len(), &self)),
            }
        }
        Ok(Value::Sequence(out))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Node, A::Error>
    where
        A: MapAccess<'de>,
    {
        let Value::Mapping(entries) = self.0 else {
            return Err(de::Error::invalid_type(de::Unexpected::Map, &self));
        };
        let mut out = Mapping::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(key) = map.next_key_seed(SourceText(key))? else {
                return Err(de::Error::invalid_length(out.len(), &self));
            };
            let value = map.next_value_seed(SourceText(value))?;
            out.insert(key, value);
        }
        Ok(Value::Mapping(out))
    }
}

/// Get the scalar text a directive operates on, or fail with a structural
/// error naming the directive.
pub fn require_scalar(tag: &str, node: &Node) -> Result<String> {
    scalar_text(node).ok_or_else(|| Error::non_scalar(tag))
}

/// Short human-readable description of a node, used in log lines
pub fn describe(node: &Node) -> String {
    match node {
        Value::Sequence(seq) => format!("sequence of {}", seq.len()),
        Value::Mapping(map) => format!("mapping of {}", map.len()),
        Value::Tagged(tagged) => format!("{} {}", tagged.tag, describe(&tagged.value)),
        other => scalar_text(other).unwrap_or_default(),
    }
}
