//! Transport-neutral documents produced by the serializer

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::tree::NodeId;
use crate::value::{InvocationKind, Param};

/// Full serialized content of a render tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub targets: Vec<TargetNode>,
}

/// One top-level node of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNode {
    pub id: NodeId,
    pub value: DocNode,
}

/// Type tag of a primitive leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: String,
    pub value: DocNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: DocNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocNode {
    Leaf {
        #[serde(rename = "type")]
        type_tag: TypeTag,
        value: JsonValue,
    },
    Enum {
        type_name: String,
        value: String,
        options: Vec<String>,
    },
    List {
        items: Vec<DocNode>,
    },
    Map {
        entries: Vec<MapEntry>,
    },
    Record {
        type_name: String,
        fields: Vec<Field>,
    },
    /// Reference to an entry of the registry active when the document was produced
    Callback {
        id: String,
        invocation: InvocationKind,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Vec<Param>>,
    },
    /// Output of a registered custom serializer, passed through verbatim
    Custom {
        type_name: String,
        value: JsonValue,
    },
    Opaque {
        type_name: String,
    },
}

impl DocNode {
    /// Value of a primitive leaf
    pub fn leaf_value(&self) -> Option<&JsonValue> {
        match self {
            DocNode::Leaf { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Field of a record node by name
    pub fn field(&self, name: &str) -> Option<&DocNode> {
        match self {
            DocNode::Record { fields, .. } => fields.iter().find(|f| f.name == name).map(|f| &f.value),
            _ => None,
        }
    }

    fn collect_callbacks<'a>(&'a self, out: &mut Vec<&'a DocNode>) {
        match self {
            DocNode::Callback { .. } => out.push(self),
            DocNode::List { items } => items.iter().for_each(|item| item.collect_callbacks(out)),
            DocNode::Map { entries } => entries.iter().for_each(|e| e.value.collect_callbacks(out)),
            DocNode::Record { fields, .. } => fields.iter().for_each(|f| f.value.collect_callbacks(out)),
            _ => {}
        }
    }
}

#[derive(Serialize)]
struct RenderEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    document: &'a Document,
}

impl Document {
    /// Encode as a `render` push message
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&RenderEnvelope {
            kind: "render",
            document: self,
        })?)
    }

    /// Every callback reference, in document order
    pub fn callbacks(&self) -> Vec<&DocNode> {
        let mut out = Vec::new();
        for target in &self.targets {
            target.value.collect_callbacks(&mut out);
        }
        out
    }

    /// Every callback identifier, in document order
    pub fn callback_ids(&self) -> Vec<&str> {
        self.callbacks()
            .into_iter()
            .filter_map(|node| match node {
                DocNode::Callback { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Identifier of the first callback with the given label
    pub fn find_callback(&self, label: &str) -> Option<&str> {
        self.callbacks().into_iter().find_map(|node| match node {
            DocNode::Callback { id, label: l, .. } if l == label => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn target(&self, id: NodeId) -> Option<&DocNode> {
        self.targets.iter().find(|t| t.id == id).map(|t| &t.value)
    }
}
