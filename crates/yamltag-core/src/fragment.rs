//! Resolved subtree holder

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::{self, Node, NodeKind};

/// A fully resolved subtree.
///
/// Use it as a load destination (or as a field of one) to capture part of
/// a document as a tree and decode it later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment {
    content: Node,
}

impl Fragment {
    pub fn new(content: Node) -> Self {
        Self { content }
    }

    pub fn node(&self) -> &Node {
        &self.content
    }

    pub fn into_node(self) -> Node {
        self.content
    }

    pub fn kind(&self) -> NodeKind {
        node::kind(&self.content)
    }

    /// Decode the subtree into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(self.content.clone()).map_err(|e| Error::decode(e.to_string()))
    }
}

impl From<Node> for Fragment {
    fn from(content: Node) -> Self {
        Self::new(content)
    }
}
