//! Frame and value abstractions supplied by the tracing engine.
//!
//! The registry never inspects debuggee memory itself. Everything it knows
//! about a suspended program comes through [`DebugFrame`] and [`DebugValue`],
//! which the tracing engine implements on top of whatever runtime it drives.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a frame or value as reported by the tracing engine.
///
/// Two references with the same id denote the same live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a real thread or of a sub-execution (e.g. a coroutine) riding on one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Coarse classification used to pick a child resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCategory {
    Scalar,
    Text,
    Bytes,
    Sequence,
    Mapping,
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Structural view of a value, materialized on demand.
#[derive(Debug, Clone)]
pub enum ValueView {
    Scalar(Scalar),
    Text(String),
    Bytes(Vec<u8>),
    Sequence(Vec<ValueRef>),
    Mapping(Vec<(ValueRef, ValueRef)>),
    Object(Vec<(String, ValueRef)>),
}

/// A value living in the suspended program.
pub trait DebugValue: Send + Sync + fmt::Debug {
    fn object_id(&self) -> ObjectId;

    fn type_name(&self) -> String;

    /// Cheap classification; must agree with the variant returned by `view`.
    fn category(&self) -> ValueCategory;

    fn view(&self) -> ValueView;
}

pub type ValueRef = Arc<dyn DebugValue>;

/// One frame of a suspended call stack.
pub trait DebugFrame: Send + Sync + fmt::Debug {
    fn object_id(&self) -> ObjectId;

    fn function_name(&self) -> String;

    /// Line the frame is currently executing.
    fn line(&self) -> u32;

    fn source_path(&self) -> Option<String> {
        None
    }

    /// Local bindings, in no particular order.
    fn locals(&self) -> Vec<(String, ValueRef)>;

    /// The calling frame, or `None` at the bottom of the stack.
    fn caller(&self) -> Option<FrameRef>;
}

pub type FrameRef = Arc<dyn DebugFrame>;

/// Per-frame line overrides keyed by frame identity.
///
/// Unhandled exceptions are reported at a different line than the one the
/// frame is executing, so the tracing engine may supply these at suspend time.
pub type LineOverrides = HashMap<ObjectId, u32>;
