//! Frame and variable nodes.
//!
//! Nodes never register themselves anywhere. Whoever builds them (the session
//! tracker) passes a registration callback that turns a [`Binding`] into a
//! handle-carrying [`VariableNode`], which keeps the handle table in one place.

use crate::config::RegistryConfig;
use crate::format::{quote_text, FormatOptions, ValueFormatter};
use crate::handle::Handle;
use crate::protocol::{PresentationAttribute, PresentationHint, VariableData};
use crate::resolver::{attribute_sort_key, ResolverTable};
use crate::value::{FrameRef, ValueRef, ValueView};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Collaborators shared by every node of a registry.
pub struct InspectContext {
    pub config: RegistryConfig,
    pub resolvers: ResolverTable,
    pub formatter: Arc<dyn ValueFormatter>,
}

impl fmt::Debug for InspectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspectContext")
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

/// A value bound under a name, before it has been given a handle.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub value: ValueRef,
    pub evaluate_name: Option<String>,
    pub is_return_value: bool,
}

impl Binding {
    pub fn new(name: impl Into<String>, value: ValueRef) -> Self {
        Self {
            name: name.into(),
            value,
            evaluate_name: None,
            is_return_value: false,
        }
    }

    pub fn with_evaluate_name(mut self, evaluate_name: Option<String>) -> Self {
        self.evaluate_name = evaluate_name;
        self
    }
}

/// A named value of a suspended program.
///
/// A handle stands for the value, not for the name it was reached through.
/// When one object is bound under several names, the first node registered
/// for it answers every lookup by handle, so expanding any alias yields
/// children whose evaluable paths start from that first name.
#[derive(Debug)]
pub struct VariableNode {
    binding: Binding,
    handle: Handle,
    is_container: bool,
    children: OnceLock<Vec<Arc<VariableNode>>>,
}

impl VariableNode {
    pub(crate) fn new(binding: Binding, handle: Handle, is_container: bool) -> Self {
        Self {
            binding,
            handle,
            is_container,
            children: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn value(&self) -> &ValueRef {
        &self.binding.value
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn evaluate_name(&self) -> Option<&str> {
        self.binding.evaluate_name.as_deref()
    }

    pub fn is_return_value(&self) -> bool {
        self.binding.is_return_value
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    /// Renders the node for a variables listing.
    pub fn display(&self, ctx: &InspectContext, fmt: &FormatOptions) -> VariableData {
        let details = ctx.formatter.describe(self.binding.value.as_ref(), fmt);

        let mut attributes = Vec::new();
        if ctx.config.is_raw_string_type(&details.type_name) {
            attributes.push(PresentationAttribute::RawString);
        }

        let mut name = self.binding.name.clone();
        if self.binding.is_return_value {
            attributes.push(PresentationAttribute::ReadOnly);
            name = format!("(return) {}", name);
        }

        VariableData {
            name,
            value: details.display,
            type_name: details.type_name,
            evaluate_name: self.binding.evaluate_name.clone(),
            variables_reference: self.is_container.then_some(self.handle),
            presentation_hint: (!attributes.is_empty()).then_some(PresentationHint { attributes }),
        }
    }

    /// Child nodes, resolved and registered on the first call and cached
    /// afterwards. Non-containers have no children.
    pub fn children<F>(
        &self,
        ctx: &InspectContext,
        fmt: &FormatOptions,
        register: F,
    ) -> Vec<Arc<VariableNode>>
    where
        F: FnMut(Binding) -> Arc<VariableNode>,
    {
        self.children
            .get_or_init(|| self.resolve_children(ctx, fmt, register))
            .clone()
    }

    fn resolve_children<F>(
        &self,
        ctx: &InspectContext,
        fmt: &FormatOptions,
        mut register: F,
    ) -> Vec<Arc<VariableNode>>
    where
        F: FnMut(Binding) -> Arc<VariableNode>,
    {
        if !self.is_container {
            return Vec::new();
        }
        let value = self.binding.value.as_ref();
        let Some(resolver) = ctx.resolvers.classify(value) else {
            return Vec::new();
        };

        // Children of a value that cannot be re-evaluated cannot be either.
        let parent_path = self
            .binding
            .evaluate_name
            .as_deref()
            .filter(|path| !path.is_empty());

        resolver
            .children(value, fmt)
            .into_entries()
            .into_iter()
            .map(|entry| {
                let evaluate_name = match (parent_path, &entry.suffix) {
                    (Some(parent), Some(suffix)) => Some(suffix.apply(parent)),
                    _ => None,
                };
                register(Binding::new(entry.name, entry.value).with_evaluate_name(evaluate_name))
            })
            .collect()
    }
}

/// A frame of a suspended thread with its locals.
#[derive(Debug)]
pub struct FrameNode {
    frame: FrameRef,
    handle: Handle,
    locals: Vec<Arc<VariableNode>>,
}

impl FrameNode {
    /// Materializes the frame's locals, sorted with [`attribute_sort_key`].
    ///
    /// The configured return-values binding is not shown itself; each value
    /// it captured becomes a read-only local of its own.
    pub(crate) fn new<F>(frame: FrameRef, handle: Handle, ctx: &InspectContext, register: F) -> Self
    where
        F: FnMut(Binding) -> Arc<VariableNode>,
    {
        let mut bindings = Vec::new();
        for (name, value) in frame.locals() {
            if name != ctx.config.return_values_binding {
                bindings.push(Binding::new(name.clone(), value).with_evaluate_name(Some(name)));
                continue;
            }
            match value.view() {
                ValueView::Mapping(entries) => {
                    for (key, captured) in entries {
                        let (key_name, key_literal) = match key.view() {
                            ValueView::Text(text) => {
                                let literal = quote_text(&text);
                                (text, literal)
                            }
                            _ => {
                                let display = ctx
                                    .formatter
                                    .describe(key.as_ref(), &FormatOptions::default())
                                    .display;
                                (display.clone(), display)
                            }
                        };
                        bindings.push(Binding {
                            name: key_name,
                            value: captured,
                            evaluate_name: Some(format!("{}[{}]", name, key_literal)),
                            is_return_value: true,
                        });
                    }
                }
                _ => {
                    tracing::debug!(
                        binding = %name,
                        type_name = %value.type_name(),
                        "return-values binding is not a mapping, showing it as a plain local"
                    );
                    bindings.push(Binding::new(name.clone(), value).with_evaluate_name(Some(name)));
                }
            }
        }

        bindings.sort_by(|a, b| attribute_sort_key(&a.name).cmp(&attribute_sort_key(&b.name)));
        let locals = bindings.into_iter().map(register).collect();

        Self {
            frame,
            handle,
            locals,
        }
    }

    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn locals(&self) -> &[Arc<VariableNode>] {
        &self.locals
    }
}

/// Anything addressable by a handle.
#[derive(Debug, Clone)]
pub enum Node {
    Frame(Arc<FrameNode>),
    Variable(Arc<VariableNode>),
}

impl Node {
    pub fn handle(&self) -> Handle {
        match self {
            Self::Frame(frame) => frame.handle(),
            Self::Variable(variable) => variable.handle(),
        }
    }

    pub fn as_variable(&self) -> Option<&Arc<VariableNode>> {
        match self {
            Self::Variable(variable) => Some(variable),
            Self::Frame(_) => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Arc<FrameNode>> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Variable(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod tests;
