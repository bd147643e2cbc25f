//! Invocable actions and their parameter descriptors
//!
//! An action is either a zero-argument "link" or a "form" that takes a list
//! of typed parameters. Arguments arriving over the wire are decoded against
//! the declared [`ParamType`] list before the action is ever called.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{Enumerated, Value};
use crate::error::{Error, Result};

/// Result returned by user actions
pub type Outcome = anyhow::Result<()>;

/// Lets action closures return either `()` or `anyhow::Result<()>`
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Ok(())
    }
}

impl IntoOutcome for anyhow::Result<()> {
    fn into_outcome(self) -> Outcome {
        self
    }
}

/// How an action is invoked from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Link,
    Form,
}

impl InvocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InvocationKind::Link => "link",
            InvocationKind::Form => "form",
        }
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a form parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Float,
    String,
    Enum {
        type_name: String,
        variants: Vec<String>,
    },
}

impl ParamType {
    pub fn of_enum<E: Enumerated>() -> Self {
        ParamType::Enum {
            type_name: E::TYPE_NAME.to_string(),
            variants: E::VARIANTS.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn describe(&self) -> String {
        match self {
            ParamType::Bool => "bool".to_string(),
            ParamType::Int => "int".to_string(),
            ParamType::Float => "float".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Enum { type_name, .. } => format!("enum {}", type_name),
        }
    }

    /// Decode one positional argument payload into a value of this type
    pub fn decode(&self, index: usize, payload: &JsonValue) -> Result<Value> {
        let decoded = match (self, payload) {
            (ParamType::Bool, JsonValue::Bool(b)) => Some(Value::Bool(*b)),
            (ParamType::Int, JsonValue::Number(n)) => n.as_i64().map(Value::Int),
            (ParamType::Float, JsonValue::Number(n)) => n.as_f64().map(Value::Float),
            (ParamType::String, JsonValue::String(s)) => Some(Value::String(s.clone())),
            (ParamType::Enum { type_name, variants }, JsonValue::String(s)) => variants
                .iter()
                .any(|v| v == s)
                .then(|| {
                    Value::Enum(super::EnumValue {
                        type_name: type_name.clone(),
                        variant: s.clone(),
                        variants: variants.clone(),
                    })
                }),
            _ => None,
        };

        decoded.ok_or_else(|| Error::ArgumentDeserialization {
            index,
            expected: self.describe(),
            reason: format!("cannot read {}", payload),
        })
    }
}

/// A named, typed form parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(flatten)]
    pub ty: ParamType,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn of<T: FromArg>(name: impl Into<String>) -> Self {
        Self::new(name, T::param_type())
    }
}

/// Rust types that can be received as form arguments
pub trait FromArg: Sized {
    fn param_type() -> ParamType;
    fn from_value(value: Value) -> Option<Self>;
}

impl FromArg for bool {
    fn param_type() -> ParamType {
        ParamType::Bool
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromArg for i64 {
    fn param_type() -> ParamType {
        ParamType::Int
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromArg for f64 {
    fn param_type() -> ParamType {
        ParamType::Float
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FromArg for String {
    fn param_type() -> ParamType {
        ParamType::String
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Decoded arguments handed to a form action
#[derive(Debug, Clone, Default)]
pub struct FormArgs {
    values: Vec<Value>,
}

impl FormArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Move the argument at `index` out as `T`
    pub fn take<T: FromArg>(&mut self, index: usize) -> anyhow::Result<T> {
        let value = self
            .values
            .get_mut(index)
            .map(std::mem::take)
            .ok_or_else(|| anyhow::anyhow!("form argument {} is missing", index))?;
        T::from_value(value)
            .ok_or_else(|| anyhow::anyhow!("form argument {} has an unexpected type", index))
    }
}

type LinkFn = dyn Fn() -> Outcome + Send + Sync;
type FormFn = dyn Fn(FormArgs) -> Outcome + Send + Sync;

/// Invocable member of a rendered value
#[derive(Clone)]
pub enum Action {
    Link {
        label: String,
        run: Arc<LinkFn>,
    },
    Form {
        label: String,
        params: Vec<Param>,
        run: Arc<FormFn>,
    },
}

impl Action {
    /// Zero-argument action
    pub fn link<F, R>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Action::Link {
            label: label.into(),
            run: Arc::new(move || f().into_outcome()),
        }
    }

    /// Action taking an explicit parameter list
    ///
    /// An empty list yields a link, since there is nothing to collect.
    pub fn form<F, R>(label: impl Into<String>, params: Vec<Param>, f: F) -> Self
    where
        F: Fn(FormArgs) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        if params.is_empty() {
            return Action::Link {
                label: label.into(),
                run: Arc::new(move || f(FormArgs::default()).into_outcome()),
            };
        }
        Action::Form {
            label: label.into(),
            params,
            run: Arc::new(move |args| f(args).into_outcome()),
        }
    }

    pub fn form1<A, F, R>(label: impl Into<String>, name: &str, f: F) -> Self
    where
        A: FromArg,
        F: Fn(A) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self::form(label, vec![Param::of::<A>(name)], move |mut args| {
            let a = args.take::<A>(0)?;
            f(a).into_outcome()
        })
    }

    pub fn form2<A, B, F, R>(label: impl Into<String>, names: [&str; 2], f: F) -> Self
    where
        A: FromArg,
        B: FromArg,
        F: Fn(A, B) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let params = vec![Param::of::<A>(names[0]), Param::of::<B>(names[1])];
        Self::form(label, params, move |mut args| {
            let a = args.take::<A>(0)?;
            let b = args.take::<B>(1)?;
            f(a, b).into_outcome()
        })
    }

    pub fn form3<A, B, C, F, R>(label: impl Into<String>, names: [&str; 3], f: F) -> Self
    where
        A: FromArg,
        B: FromArg,
        C: FromArg,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let params = vec![
            Param::of::<A>(names[0]),
            Param::of::<B>(names[1]),
            Param::of::<C>(names[2]),
        ];
        Self::form(label, params, move |mut args| {
            let a = args.take::<A>(0)?;
            let b = args.take::<B>(1)?;
            let c = args.take::<C>(2)?;
            f(a, b, c).into_outcome()
        })
    }

    pub fn kind(&self) -> InvocationKind {
        match self {
            Action::Link { .. } => InvocationKind::Link,
            Action::Form { .. } => InvocationKind::Form,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Action::Link { label, .. } | Action::Form { label, .. } => label,
        }
    }

    pub fn params(&self) -> &[Param] {
        match self {
            Action::Link { .. } => &[],
            Action::Form { params, .. } => params,
        }
    }

    /// Check the invocation kind and decode arguments without running anything
    pub fn prepare(&self, id: &str, kind: InvocationKind, args: Option<&[JsonValue]>) -> Result<PreparedCall> {
        if kind != self.kind() {
            return Err(Error::KindMismatch {
                id: id.to_string(),
                expected: self.kind().as_str(),
                got: kind.as_str(),
            });
        }

        match self {
            Action::Link { run, .. } => Ok(PreparedCall::Link(run.clone())),
            Action::Form { params, run, .. } => {
                let args = args.ok_or_else(|| {
                    Error::Protocol(format!("form invocation of {} carries no `args`", id))
                })?;
                if args.len() != params.len() {
                    return Err(Error::Protocol(format!(
                        "form {} expects {} arguments, got {}",
                        id,
                        params.len(),
                        args.len()
                    )));
                }
                let values = params
                    .iter()
                    .zip(args)
                    .enumerate()
                    .map(|(index, (param, payload))| param.ty.decode(index, payload))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PreparedCall::Form(run.clone(), FormArgs::new(values)))
            }
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind())
            .field("label", &self.label())
            .field("params", &self.params())
            .finish()
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Action::Link { run: a, .. }, Action::Link { run: b, .. }) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Action::Form { run: a, .. }, Action::Form { run: b, .. }) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

/// An action whose arguments have been decoded and is ready to run
pub enum PreparedCall {
    Link(Arc<LinkFn>),
    Form(Arc<FormFn>, FormArgs),
}

impl PreparedCall {
    /// Run the action; errors and panics surface as [`Error::CallbackFault`]
    pub fn call(self) -> Result<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || match self {
            PreparedCall::Link(run) => run(),
            PreparedCall::Form(run, args) => run(args),
        }));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::CallbackFault(format!("{:#}", e))),
            Err(payload) => Err(Error::CallbackFault(panic_message(payload.as_ref()))),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
