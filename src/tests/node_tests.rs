use super::*;
use crate::format::ReprFormatter;
use crate::handle::HandleAllocator;
use crate::snapshot::{Heap, HeapFrame};
use crate::value::ObjectId;
use std::collections::HashMap;

fn context() -> InspectContext {
    InspectContext {
        config: RegistryConfig::default(),
        resolvers: ResolverTable::new(),
        formatter: Arc::new(ReprFormatter::default()),
    }
}

/// Minimal stand-in for a session's handle table.
struct Table {
    allocator: HandleAllocator,
    by_identity: HashMap<ObjectId, Handle>,
}

impl Table {
    fn new() -> Self {
        Self {
            allocator: HandleAllocator::new(),
            by_identity: HashMap::new(),
        }
    }

    fn register(&mut self, ctx: &InspectContext, binding: Binding) -> Arc<VariableNode> {
        let allocator = &self.allocator;
        let handle = *self
            .by_identity
            .entry(binding.value.object_id())
            .or_insert_with(|| allocator.mint());
        let is_container = ctx.resolvers.is_container(binding.value.as_ref());
        Arc::new(VariableNode::new(binding, handle, is_container))
    }
}

#[test]
fn locals_are_sorted_with_special_names_last() {
    let ctx = context();
    let heap = Heap::new();
    let frame = HeapFrame::new(ObjectId(1), "f", 3)
        .with_local("_x", heap.int(1))
        .with_local("b", heap.int(2))
        .with_local("__y__", heap.int(3))
        .with_local("a", heap.int(4))
        .into_ref();

    let mut table = Table::new();
    let node = FrameNode::new(frame, Handle::from_raw(100), &ctx, |b| table.register(&ctx, b));

    let names: Vec<_> = node.locals().iter().map(|l| l.name()).collect();
    assert_eq!(names, vec!["a", "b", "_x", "__y__"]);
    assert!(node.locals().iter().all(|l| l.evaluate_name() == Some(l.name())));
}

#[test]
fn return_values_are_unpacked_into_read_only_locals() {
    let ctx = context();
    let heap = Heap::new();
    let returns = heap.dict(&[(heap.str("foo"), heap.int(3))]);
    let frame = HeapFrame::new(ObjectId(1), "caller", 10)
        .with_local("__return_values__", returns)
        .with_local("x", heap.int(1))
        .into_ref();

    let mut table = Table::new();
    let node = FrameNode::new(frame, Handle::from_raw(1), &ctx, |b| table.register(&ctx, b));

    assert_eq!(node.locals().len(), 2);
    let foo = node
        .locals()
        .iter()
        .find(|l| l.is_return_value())
        .expect("return value local");
    assert_eq!(foo.name(), "foo");
    assert_eq!(foo.evaluate_name(), Some("__return_values__['foo']"));

    let data = foo.display(&ctx, &FormatOptions::default());
    assert_eq!(data.name, "(return) foo");
    assert_eq!(data.value, "3");
    assert!(data.has_attribute(PresentationAttribute::ReadOnly));
    assert!(!node.locals().iter().any(|l| l.name() == "__return_values__"));
}

#[test]
fn return_values_binding_name_is_configurable() {
    let mut ctx = context();
    ctx.config.return_values_binding = "$ret".to_string();
    let heap = Heap::new();
    let returns = heap.dict(&[(heap.str("g"), heap.none())]);
    let frame = HeapFrame::new(ObjectId(1), "f", 1)
        .with_local("$ret", returns)
        .into_ref();

    let mut table = Table::new();
    let node = FrameNode::new(frame, Handle::from_raw(1), &ctx, |b| table.register(&ctx, b));

    assert_eq!(node.locals()[0].evaluate_name(), Some("$ret['g']"));
}

#[test]
fn non_mapping_return_binding_is_a_plain_local() {
    let ctx = context();
    let heap = Heap::new();
    let frame = HeapFrame::new(ObjectId(1), "f", 1)
        .with_local("__return_values__", heap.int(5))
        .into_ref();

    let mut table = Table::new();
    let node = FrameNode::new(frame, Handle::from_raw(1), &ctx, |b| table.register(&ctx, b));

    assert_eq!(node.locals().len(), 1);
    assert_eq!(node.locals()[0].name(), "__return_values__");
    assert!(!node.locals()[0].is_return_value());
}

#[test]
fn display_marks_containers_and_raw_strings() {
    let ctx = context();
    let heap = Heap::new();
    let mut table = Table::new();

    let list = table.register(
        &ctx,
        Binding::new("k", heap.list(&[heap.int(1)])).with_evaluate_name(Some("k".into())),
    );
    let text = table.register(&ctx, Binding::new("s", heap.str("hi")));
    let number = table.register(&ctx, Binding::new("n", heap.int(1)));

    let list_data = list.display(&ctx, &FormatOptions::default());
    assert_eq!(list_data.variables_reference, Some(list.handle()));
    assert_eq!(list_data.evaluate_name.as_deref(), Some("k"));
    assert!(list_data.presentation_hint.is_none());

    let text_data = text.display(&ctx, &FormatOptions::default());
    assert_eq!(text_data.variables_reference, None);
    assert!(text_data.has_attribute(PresentationAttribute::RawString));

    let number_data = number.display(&ctx, &FormatOptions::default());
    assert_eq!(number_data.type_name, "int");
    assert!(number_data.presentation_hint.is_none());
}

#[test]
fn children_get_paths_and_are_cached() {
    let ctx = context();
    let heap = Heap::new();
    let mut table = Table::new();
    let list = table.register(
        &ctx,
        Binding::new("k", heap.list(&[heap.int(1), heap.int(2)]))
            .with_evaluate_name(Some("k".into())),
    );

    let mut calls = 0;
    let first = list.children(&ctx, &FormatOptions::default(), |b| {
        calls += 1;
        table.register(&ctx, b)
    });
    let second = list.children(&ctx, &FormatOptions::default(), |b| table.register(&ctx, b));

    assert_eq!(calls, 2);
    let names: Vec<_> = first.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["0", "1"]);
    let paths: Vec<_> = first.iter().map(|c| c.evaluate_name()).collect();
    assert_eq!(paths, vec![Some("k[0]"), Some("k[1]")]);
    assert!(Arc::ptr_eq(&first[0], &second[0]));
}

#[test]
fn children_of_unevaluable_parent_have_no_path() {
    let ctx = context();
    let heap = Heap::new();
    let mut table = Table::new();
    let list = table.register(&ctx, Binding::new("k", heap.list(&[heap.int(1)])));

    let children = list.children(&ctx, &FormatOptions::default(), |b| table.register(&ctx, b));
    assert_eq!(children[0].evaluate_name(), None);
}

#[test]
fn non_containers_have_no_children() {
    let ctx = context();
    let heap = Heap::new();
    let mut table = Table::new();
    let number = table.register(&ctx, Binding::new("n", heap.int(1)));

    let children = number.children(&ctx, &FormatOptions::default(), |b| table.register(&ctx, b));
    assert!(children.is_empty());
}

#[test]
fn frame_nodes_are_addressed_by_their_handle() {
    let ctx = context();
    let frame = HeapFrame::new(ObjectId(9), "main", 12).into_ref();
    let mut table = Table::new();
    let node = FrameNode::new(frame, Handle::from_raw(77), &ctx, |b| table.register(&ctx, b));

    let node = Node::Frame(Arc::new(node));
    assert_eq!(node.handle(), Handle::from_raw(77));
    assert!(node.as_variable().is_none());
    assert_eq!(node.as_frame().unwrap().frame().line(), 12);
}
