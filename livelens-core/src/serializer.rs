//! Tree serialization and callback extraction
//!
//! Walking a tree produces a [`Document`] and, as a side effect, fills a
//! [`CallbackRegistry`] with every action found along the way. Each action
//! is replaced in the document by a reference carrying its fresh identifier.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Number, Value as JsonValue};
use std::any::Any;
use std::sync::Arc;

use crate::document::{DocNode, Document, Field, MapEntry, TargetNode, TypeTag};
use crate::registry::CallbackRegistry;
use crate::tree::RenderTree;
use crate::value::{InvocationKind, Value};

/// Serialization hook for one runtime type
pub type CustomSerializer = Arc<dyn Fn(&Value) -> JsonValue + Send + Sync>;

/// Serializer with a table of per-type overrides
///
/// Overrides are consulted before the generic structural walk. They run
/// while a renderer holds its registry lock and must not touch render targets.
#[derive(Default)]
pub struct Serializer {
    custom: RwLock<FxHashMap<String, CustomSerializer>>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override serialization of an opaque Rust type
    pub fn register<T, F>(&self, f: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> JsonValue + Send + Sync + 'static,
    {
        let hook: CustomSerializer = Arc::new(move |value: &Value| match value {
            Value::Opaque(opaque) => opaque.downcast_ref::<T>().map(&f).unwrap_or(JsonValue::Null),
            _ => JsonValue::Null,
        });
        self.custom
            .write()
            .insert(std::any::type_name::<T>().to_string(), hook);
    }

    /// Override serialization of every value whose runtime type name is `type_name`
    pub fn register_named<F>(&self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&Value) -> JsonValue + Send + Sync + 'static,
    {
        self.custom.write().insert(type_name.into(), Arc::new(f));
    }

    pub fn has_custom(&self, type_name: &str) -> bool {
        self.custom.read().contains_key(type_name)
    }

    /// Serialize the whole tree into `registry`
    ///
    /// The caller clears the registry first; the tree is only read.
    pub fn serialize(&self, tree: &RenderTree, registry: &mut CallbackRegistry) -> Document {
        let custom = self.custom.read();
        let targets = tree
            .snapshot()
            .into_iter()
            .map(|(id, value)| TargetNode {
                id,
                value: node(&value, registry, &custom),
            })
            .collect();
        Document { targets }
    }

    /// Serialize a single value
    pub fn serialize_value(&self, value: &Value, registry: &mut CallbackRegistry) -> DocNode {
        node(value, registry, &self.custom.read())
    }
}

fn node(value: &Value, registry: &mut CallbackRegistry, custom: &FxHashMap<String, CustomSerializer>) -> DocNode {
    if let Some(hook) = custom.get(value.type_name()) {
        return DocNode::Custom {
            type_name: value.type_name().to_string(),
            value: hook(value),
        };
    }

    match value {
        Value::Null => leaf(TypeTag::Null, JsonValue::Null),
        Value::Bool(b) => leaf(TypeTag::Bool, JsonValue::Bool(*b)),
        Value::Int(i) => leaf(TypeTag::Int, JsonValue::from(*i)),
        Value::Float(f) => leaf(TypeTag::Float, float(*f)),
        Value::String(s) => leaf(TypeTag::String, JsonValue::String(s.clone())),
        Value::Enum(e) => DocNode::Enum {
            type_name: e.type_name.clone(),
            value: e.variant.clone(),
            options: e.variants.clone(),
        },
        Value::List(items) => DocNode::List {
            items: items.iter().map(|item| node(item, registry, custom)).collect(),
        },
        Value::Map(entries) => DocNode::Map {
            entries: entries
                .iter()
                .map(|(key, value)| MapEntry {
                    key: key.clone(),
                    value: node(value, registry, custom),
                })
                .collect(),
        },
        Value::Record(record) => DocNode::Record {
            type_name: record.type_name.clone(),
            fields: record
                .fields
                .iter()
                .map(|(name, value)| Field {
                    name: name.clone(),
                    value: node(value, registry, custom),
                })
                .collect(),
        },
        Value::Action(action) => {
            let invocation = action.kind();
            let params = (invocation == InvocationKind::Form).then(|| action.params().to_vec());
            let label = action.label().to_string();
            let id = registry.register(action.clone());
            DocNode::Callback {
                id,
                invocation,
                label,
                params,
            }
        }
        Value::Opaque(opaque) => DocNode::Opaque {
            type_name: opaque.type_name().to_string(),
        },
    }
}

fn leaf(type_tag: TypeTag, value: JsonValue) -> DocNode {
    DocNode::Leaf { type_tag, value }
}

// JSON has no NaN or infinities
fn float(f: f64) -> JsonValue {
    match Number::from_f64(f) {
        Some(n) => JsonValue::Number(n),
        None if f.is_nan() => JsonValue::String("NaN".to_string()),
        None if f > 0.0 => JsonValue::String("inf".to_string()),
        None => JsonValue::String("-inf".to_string()),
    }
}
