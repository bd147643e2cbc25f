//! Values that can be placed into a render tree
//!
//! The core only cares about a handful of things: whether a value is a
//! container, whether it is an invocable [`Action`], and what its runtime type
//! name is (the key custom serializers are registered under). Everything else
//! is a primitive leaf.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub mod action;

pub use action::{Action, FormArgs, FromArg, IntoOutcome, InvocationKind, Outcome, Param, ParamType};

/// A node value inside a render tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(EnumValue),
    List(Vec<Value>),
    /// Insertion-ordered mapping
    Map(Vec<(String, Value)>),
    Record(Record),
    Action(Action),
    Opaque(Opaque),
}

impl Value {
    /// Runtime type name, used to look up custom serializers
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Enum(e) => &e.type_name,
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(r) => &r.type_name,
            Value::Action(_) => "action",
            Value::Opaque(o) => o.type_name,
        }
    }

    /// Build an enum value from a type declared with [`enumerated!`](crate::enumerated)
    pub fn from_enum<E: Enumerated>(value: &E) -> Self {
        Value::Enum(EnumValue {
            type_name: E::TYPE_NAME.to_string(),
            variant: value.name().to_string(),
            variants: E::VARIANTS.iter().map(|v| v.to_string()).collect(),
        })
    }

    /// Wrap an arbitrary Rust value; only a registered custom serializer can look inside
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Opaque::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_) | Value::Record(_))
    }
}

/// Enumerated value, carried by symbolic name
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub type_name: String,
    pub variant: String,
    pub variants: Vec<String>,
}

/// Structured record with ordered, named fields
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, keeping declaration order
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Arbitrary payload that the core cannot introspect
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque").field("type_name", &self.type_name).finish()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Rust enums that travel by variant name
///
/// Implement it with the [`enumerated!`](crate::enumerated) macro rather than by hand.
pub trait Enumerated: Sized + 'static {
    const TYPE_NAME: &'static str;
    const VARIANTS: &'static [&'static str];

    fn name(&self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;
}

/// Declare a fieldless enum as renderable and usable as a form parameter
///
/// ```
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Title { Mr, Mrs }
/// livelens_core::enumerated!(Title { Mr, Mrs });
///
/// let value: livelens_core::Value = Title::Mrs.into();
/// assert_eq!(value.type_name(), "Title");
/// ```
#[macro_export]
macro_rules! enumerated {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::value::Enumerated for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);
            const VARIANTS: &'static [&'static str] = &[$(stringify!($variant)),+];

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<$ty> for $crate::value::Value {
            fn from(value: $ty) -> Self {
                $crate::value::Value::from_enum(&value)
            }
        }

        impl $crate::value::FromArg for $ty {
            fn param_type() -> $crate::value::ParamType {
                $crate::value::ParamType::of_enum::<$ty>()
            }

            fn from_value(value: $crate::value::Value) -> Option<Self> {
                match value {
                    $crate::value::Value::Enum(e) => {
                        <$ty as $crate::value::Enumerated>::from_name(&e.variant)
                    }
                    _ => None,
                }
            }
        }
    };
}

// Conversions

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Value::Int(i64::from(i))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        // HashMap iteration order is unstable; sort so every pass emits the same document
        let mut entries: Vec<(String, Value)> = map.into_iter().map(|(k, v)| (k, v.into())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Map(entries)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        Value::Action(action)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Title {
        Mr,
        Mrs,
    }

    crate::enumerated!(Title { Mr, Mrs });

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from(3).type_name(), "int");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(Record::new("Progress")).type_name(), "Progress");
        assert_eq!(Value::from(Title::Mr).type_name(), "Title");
        assert!(Value::opaque(42u64).type_name().contains("u64"));
    }

    #[test]
    fn test_enum_carries_variant_names() {
        match Value::from(Title::Mrs) {
            Value::Enum(e) => {
                assert_eq!(e.variant, "Mrs");
                assert_eq!(e.variants, vec!["Mr".to_string(), "Mrs".to_string()]);
            }
            other => panic!("Expected enum, got {:?}", other),
        }
        assert_eq!(Title::from_name("Mr"), Some(Title::Mr));
        assert_eq!(Title::from_name("Dr"), None);
    }

    #[test]
    fn test_record_keeps_field_order() {
        let record = Record::new("Progress")
            .field("speed", "10kb/s")
            .field("max", "10MB")
            .field("percent", 0);
        let names: Vec<_> = record.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["speed", "max", "percent"]);
        assert_eq!(record.get("percent"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_hashmap_conversion_is_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        map.insert("c".to_string(), 3);
        match Value::from(map) {
            Value::Map(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b", "c"]);
            }
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
    }

    #[test]
    fn test_opaque_downcast() {
        let value = Opaque::new(vec![1u8, 2, 3]);
        assert_eq!(value.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(value.downcast_ref::<String>().is_none());
    }
}
