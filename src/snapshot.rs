//! In-memory heap implementing the frame and value abstractions.
//!
//! Used by the `frame-replay` tool to replay recorded suspend episodes, and by
//! tests. Objects refer to each other by [`ObjectId`], so shared and cyclic
//! structures are expressed naturally.

use crate::value::{
    DebugFrame, DebugValue, FrameRef, ObjectId, Scalar, ValueCategory, ValueRef, ValueView,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Contents of one heap object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectData {
    None,
    Bool { value: bool },
    Int { value: i64 },
    Float { value: f64 },
    Str { value: String },
    Bytes { value: Vec<u8> },
    List { items: Vec<ObjectId> },
    Tuple { items: Vec<ObjectId> },
    Dict { entries: Vec<(ObjectId, ObjectId)> },
    Object {
        class: String,
        #[serde(default)]
        fields: Vec<(String, ObjectId)>,
    },
}

impl ObjectData {
    /// Ids this object refers to.
    pub fn references(&self) -> Vec<ObjectId> {
        match self {
            Self::List { items } | Self::Tuple { items } => items.clone(),
            Self::Dict { entries } => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            Self::Object { fields, .. } => fields.iter().map(|(_, id)| *id).collect(),
            _ => Vec::new(),
        }
    }
}

pub struct Heap {
    objects: RwLock<HashMap<ObjectId, ObjectData>>,
    next_id: AtomicU64,
}

impl Heap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Stores `data` under a fresh id.
    pub fn alloc(self: &Arc<Self>, data: ObjectData) -> ValueRef {
        let id = ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.objects.write().insert(id, data);
        self.value(id)
    }

    /// Stores `data` under an explicit id, replacing what was there.
    pub fn insert(self: &Arc<Self>, id: ObjectId, data: ObjectData) -> ValueRef {
        self.next_id.fetch_max(id.0 + 1, Ordering::SeqCst);
        self.objects.write().insert(id, data);
        self.value(id)
    }

    /// Replaces the contents of an existing object, keeping its identity.
    pub fn set(&self, id: ObjectId, data: ObjectData) {
        self.objects.write().insert(id, data);
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.read().contains_key(&id)
    }

    /// Reference to the object stored under `id`.
    pub fn value(self: &Arc<Self>, id: ObjectId) -> ValueRef {
        Arc::new(HeapValue {
            heap: Arc::clone(self),
            id,
        })
    }

    pub fn none(self: &Arc<Self>) -> ValueRef {
        self.alloc(ObjectData::None)
    }

    pub fn int(self: &Arc<Self>, value: i64) -> ValueRef {
        self.alloc(ObjectData::Int { value })
    }

    pub fn str(self: &Arc<Self>, value: &str) -> ValueRef {
        self.alloc(ObjectData::Str {
            value: value.to_string(),
        })
    }

    pub fn list(self: &Arc<Self>, items: &[ValueRef]) -> ValueRef {
        self.alloc(ObjectData::List {
            items: items.iter().map(|item| item.object_id()).collect(),
        })
    }

    pub fn tuple(self: &Arc<Self>, items: &[ValueRef]) -> ValueRef {
        self.alloc(ObjectData::Tuple {
            items: items.iter().map(|item| item.object_id()).collect(),
        })
    }

    pub fn dict(self: &Arc<Self>, entries: &[(ValueRef, ValueRef)]) -> ValueRef {
        self.alloc(ObjectData::Dict {
            entries: entries
                .iter()
                .map(|(k, v)| (k.object_id(), v.object_id()))
                .collect(),
        })
    }

    pub fn object(self: &Arc<Self>, class: &str, fields: &[(&str, ValueRef)]) -> ValueRef {
        self.alloc(ObjectData::Object {
            class: class.to_string(),
            fields: fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.object_id()))
                .collect(),
        })
    }

    fn get(&self, id: ObjectId) -> ObjectData {
        self.objects
            .read()
            .get(&id)
            .cloned()
            .unwrap_or(ObjectData::None)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("objects", &self.objects.read().len())
            .finish()
    }
}

/// A heap object seen as a [`DebugValue`]. Dangling ids read as `None`.
pub struct HeapValue {
    heap: Arc<Heap>,
    id: ObjectId,
}

impl fmt::Debug for HeapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapValue(#{})", self.id)
    }
}

impl HeapValue {
    fn refs(&self, ids: Vec<ObjectId>) -> Vec<ValueRef> {
        ids.into_iter().map(|id| self.heap.value(id)).collect()
    }
}

impl DebugValue for HeapValue {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn type_name(&self) -> String {
        match self.heap.get(self.id) {
            ObjectData::None => "NoneType".to_string(),
            ObjectData::Bool { .. } => "bool".to_string(),
            ObjectData::Int { .. } => "int".to_string(),
            ObjectData::Float { .. } => "float".to_string(),
            ObjectData::Str { .. } => "str".to_string(),
            ObjectData::Bytes { .. } => "bytes".to_string(),
            ObjectData::List { .. } => "list".to_string(),
            ObjectData::Tuple { .. } => "tuple".to_string(),
            ObjectData::Dict { .. } => "dict".to_string(),
            ObjectData::Object { class, .. } => class,
        }
    }

    fn category(&self) -> ValueCategory {
        match self.heap.get(self.id) {
            ObjectData::None
            | ObjectData::Bool { .. }
            | ObjectData::Int { .. }
            | ObjectData::Float { .. } => ValueCategory::Scalar,
            ObjectData::Str { .. } => ValueCategory::Text,
            ObjectData::Bytes { .. } => ValueCategory::Bytes,
            ObjectData::List { .. } | ObjectData::Tuple { .. } => ValueCategory::Sequence,
            ObjectData::Dict { .. } => ValueCategory::Mapping,
            ObjectData::Object { .. } => ValueCategory::Object,
        }
    }

    fn view(&self) -> ValueView {
        match self.heap.get(self.id) {
            ObjectData::None => ValueView::Scalar(Scalar::None),
            ObjectData::Bool { value } => ValueView::Scalar(Scalar::Bool(value)),
            ObjectData::Int { value } => ValueView::Scalar(Scalar::Int(value)),
            ObjectData::Float { value } => ValueView::Scalar(Scalar::Float(value)),
            ObjectData::Str { value } => ValueView::Text(value),
            ObjectData::Bytes { value } => ValueView::Bytes(value),
            ObjectData::List { items } | ObjectData::Tuple { items } => {
                ValueView::Sequence(self.refs(items))
            }
            ObjectData::Dict { entries } => ValueView::Mapping(
                entries
                    .into_iter()
                    .map(|(k, v)| (self.heap.value(k), self.heap.value(v)))
                    .collect(),
            ),
            ObjectData::Object { fields, .. } => ValueView::Object(
                fields
                    .into_iter()
                    .map(|(name, id)| (name, self.heap.value(id)))
                    .collect(),
            ),
        }
    }
}

/// A recorded frame.
#[derive(Debug)]
pub struct HeapFrame {
    id: ObjectId,
    function: String,
    line: u32,
    source: Option<String>,
    locals: Vec<(String, ValueRef)>,
    caller: Option<FrameRef>,
}

impl HeapFrame {
    pub fn new(id: ObjectId, function: impl Into<String>, line: u32) -> Self {
        Self {
            id,
            function: function.into(),
            line,
            source: None,
            locals: Vec::new(),
            caller: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: ValueRef) -> Self {
        self.locals.push((name.into(), value));
        self
    }

    pub fn with_caller(mut self, caller: FrameRef) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl DebugFrame for HeapFrame {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn function_name(&self) -> String {
        self.function.clone()
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn source_path(&self) -> Option<String> {
        self.source.clone()
    }

    fn locals(&self) -> Vec<(String, ValueRef)> {
        self.locals.clone()
    }

    fn caller(&self) -> Option<FrameRef> {
        self.caller.clone()
    }
}

#[cfg(test)]
#[path = "tests/snapshot_tests.rs"]
mod tests;
