//! Child resolution for container values.
//!
//! A [`Resolver`] knows how to enumerate the children of one category of
//! values. [`ResolverTable`] performs the classification step that picks the
//! resolver for a given value; values whose category has no resolver are not
//! containers.

use crate::format::{quote_text, render_scalar, FormatOptions};
use crate::value::{DebugValue, ValueCategory, ValueRef, ValueView};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns a parent's evaluable path into a child's.
#[derive(Clone)]
pub enum EvaluableSuffix {
    /// Appended to the parent path verbatim, e.g. `[0]`.
    Literal(String),
    /// Computed from the whole parent path, e.g. `len(parent)`.
    Derived(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl EvaluableSuffix {
    pub fn literal(suffix: impl Into<String>) -> Self {
        Self::Literal(suffix.into())
    }

    pub fn derived(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::Derived(Arc::new(f))
    }

    pub fn apply(&self, parent: &str) -> String {
        match self {
            Self::Literal(suffix) => format!("{}{}", parent, suffix),
            Self::Derived(f) => f(parent),
        }
    }
}

impl fmt::Debug for EvaluableSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(suffix) => f.debug_tuple("Literal").field(suffix).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// One child produced by a resolver.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: String,
    pub value: ValueRef,
    pub suffix: Option<EvaluableSuffix>,
}

/// What a resolver hands back for a container.
#[derive(Debug)]
pub enum ChildListing {
    /// Already ordered, with evaluable suffixes where the resolver knows them.
    Protocol(Vec<ChildEntry>),
    /// Unordered name/value pairs; never evaluable.
    Dictionary(Vec<(String, ValueRef)>),
}

impl ChildListing {
    /// Ordered entries. Dictionary listings are sorted with [`attribute_sort_key`].
    pub fn into_entries(self) -> Vec<ChildEntry> {
        match self {
            Self::Protocol(entries) => entries,
            Self::Dictionary(mut pairs) => {
                pairs.sort_by(|a, b| attribute_sort_key(&a.0).cmp(&attribute_sort_key(&b.0)));
                pairs
                    .into_iter()
                    .map(|(name, value)| ChildEntry {
                        name,
                        value,
                        suffix: None,
                    })
                    .collect()
            }
        }
    }
}

/// Enumerates the children of one category of values.
pub trait Resolver: Send + Sync {
    fn is_container(&self, _value: &dyn DebugValue) -> bool {
        true
    }

    fn children(&self, value: &dyn DebugValue, fmt: &FormatOptions) -> ChildListing;
}

/// Sort key grouping plain names before `_private`, `__mangled` and
/// `__dunder__` names, each group alphabetical.
pub fn attribute_sort_key(name: &str) -> (u8, &str) {
    let rank = if name.starts_with("__") {
        if name.ends_with("__") {
            3
        } else {
            2
        }
    } else if name.starts_with('_') {
        1
    } else {
        0
    };
    (rank, name)
}

/// Lists and tuples. Children are named by zero-padded index so that they
/// also sort correctly as plain strings.
#[derive(Debug, Default)]
pub struct SequenceResolver;

impl Resolver for SequenceResolver {
    fn children(&self, value: &dyn DebugValue, _fmt: &FormatOptions) -> ChildListing {
        let ValueView::Sequence(items) = value.view() else {
            return ChildListing::Protocol(Vec::new());
        };
        let width = index_width(items.len());
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ChildEntry {
                name: format!("{:0width$}", i, width = width),
                value: item,
                suffix: Some(EvaluableSuffix::literal(format!("[{}]", i))),
            })
            .collect();
        ChildListing::Protocol(entries)
    }
}

fn index_width(len: usize) -> usize {
    len.saturating_sub(1).to_string().len()
}

/// Dictionaries, in insertion order.
#[derive(Debug, Default)]
pub struct MappingResolver;

impl Resolver for MappingResolver {
    fn children(&self, value: &dyn DebugValue, fmt: &FormatOptions) -> ChildListing {
        let ValueView::Mapping(entries) = value.view() else {
            return ChildListing::Protocol(Vec::new());
        };
        let entries = entries
            .into_iter()
            .map(|(key, value)| {
                let (name, evaluable) = key_repr(key.as_ref(), fmt);
                let suffix = evaluable.then(|| EvaluableSuffix::literal(format!("[{}]", name)));
                ChildEntry {
                    name,
                    value,
                    suffix,
                }
            })
            .collect();
        ChildListing::Protocol(entries)
    }
}

/// Renders a mapping key, and whether the rendering is a usable literal.
fn key_repr(key: &dyn DebugValue, fmt: &FormatOptions) -> (String, bool) {
    match key.view() {
        ValueView::Text(text) => (quote_text(&text), true),
        ValueView::Scalar(scalar) => (render_scalar(&scalar, fmt), true),
        ValueView::Bytes(bytes) => (format!("b'{}'", bytes.escape_ascii()), true),
        _ => (format!("<{} {}>", key.type_name(), key.object_id()), false),
    }
}

/// Default resolver: object fields as an unordered dictionary.
#[derive(Debug, Default)]
pub struct AttributeResolver;

impl Resolver for AttributeResolver {
    fn children(&self, value: &dyn DebugValue, _fmt: &FormatOptions) -> ChildListing {
        match value.view() {
            ValueView::Object(fields) => ChildListing::Dictionary(fields),
            _ => ChildListing::Dictionary(Vec::new()),
        }
    }
}

/// Classification step selecting a resolver per value category.
#[derive(Clone)]
pub struct ResolverTable {
    by_category: HashMap<ValueCategory, Arc<dyn Resolver>>,
}

impl ResolverTable {
    /// Table with the built-in sequence, mapping and attribute resolvers.
    pub fn new() -> Self {
        let mut by_category: HashMap<ValueCategory, Arc<dyn Resolver>> = HashMap::new();
        by_category.insert(ValueCategory::Sequence, Arc::new(SequenceResolver));
        by_category.insert(ValueCategory::Mapping, Arc::new(MappingResolver));
        by_category.insert(ValueCategory::Object, Arc::new(AttributeResolver));
        Self { by_category }
    }

    /// Replaces the resolver for a category.
    pub fn with_resolver(mut self, category: ValueCategory, resolver: Arc<dyn Resolver>) -> Self {
        self.by_category.insert(category, resolver);
        self
    }

    pub fn classify(&self, value: &dyn DebugValue) -> Option<&Arc<dyn Resolver>> {
        self.by_category.get(&value.category())
    }

    pub fn is_container(&self, value: &dyn DebugValue) -> bool {
        self.classify(value)
            .map(|resolver| resolver.is_container(value))
            .unwrap_or(false)
    }
}

impl Default for ResolverTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut categories: Vec<_> = self.by_category.keys().collect();
        categories.sort_by_key(|c| format!("{:?}", c));
        f.debug_struct("ResolverTable")
            .field("categories", &categories)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
