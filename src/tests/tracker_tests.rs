use super::*;
use crate::config::RegistryConfig;
use crate::protocol::{StopReason, StoppedEventFactory};
use crate::registry::SuspendedFramesRegistry;
use crate::snapshot::{Heap, HeapFrame};
use crate::structured_logger::{LogEntry, StructuredLogger};
use crate::value::{DebugFrame, ObjectId};
use tempfile::TempDir;

/// `main` (id 1) calls `work` (id 2); `work` holds `k = [1, 2]` and `n = 5`.
fn two_frames(heap: &Arc<Heap>) -> FrameRef {
    let main = HeapFrame::new(ObjectId(1), "main", 30).into_ref();
    HeapFrame::new(ObjectId(2), "work", 7)
        .with_local("k", heap.list(&[heap.int(1), heap.int(2)]))
        .with_local("n", heap.int(5))
        .with_caller(main)
        .into_ref()
}

fn thread(id: &str) -> ExecutionId {
    ExecutionId::new(id)
}

#[test]
fn track_lists_frames_topmost_first() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();

    session.track(&thread("T1"), two_frames(&heap), &LineOverrides::new(), None);

    let frames = session.stack_frames(&thread("T1")).expect("tracked");
    let names: Vec<_> = frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["work", "main"]);
    assert_eq!(session.main_thread_id(), Some(thread("T1")));
    assert_eq!(session.tracked_ids(), vec![thread("T1")]);
}

#[test]
fn handles_are_stable_while_the_session_is_open() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let shared = heap.list(&[heap.int(1)]);
    let frame = HeapFrame::new(ObjectId(1), "f", 1)
        .with_local("a", Arc::clone(&shared))
        .with_local("b", Arc::clone(&shared))
        .into_ref();
    let session = registry.open_session();
    session.track(&thread("T1"), frame, &LineOverrides::new(), None);

    let frame_handle = session.stack_frames(&thread("T1")).unwrap()[0].id;
    let locals = session
        .children(frame_handle, &FormatOptions::default())
        .unwrap();
    assert_eq!(locals[0].handle(), locals[1].handle());
    assert_eq!(locals[0].name(), "a");
    assert_eq!(locals[1].name(), "b");

    let first = session.variables(locals[0].handle(), &FormatOptions::default());
    let second = session.variables(locals[1].handle(), &FormatOptions::default());
    assert_eq!(first, second);

    let again = session
        .children(frame_handle, &FormatOptions::default())
        .unwrap();
    assert_eq!(again[0].handle(), locals[0].handle());
}

#[test]
fn aliases_expand_through_the_first_registered_name() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let shared = heap.list(&[heap.int(1)]);
    let frame = HeapFrame::new(ObjectId(1), "f", 1)
        .with_local("a", Arc::clone(&shared))
        .with_local("b", shared)
        .into_ref();
    let session = registry.open_session();
    session.track(&thread("T1"), frame, &LineOverrides::new(), None);

    let frame_handle = session.stack_frames(&thread("T1")).unwrap()[0].id;
    let locals = session
        .variables(frame_handle, &FormatOptions::default())
        .unwrap();
    assert_eq!(locals[1].name, "b");
    assert_eq!(locals[1].evaluate_name.as_deref(), Some("b"));
    let b_handle = locals[1].variables_reference.expect("b is a container");

    match session.get_variable(b_handle) {
        Some(Node::Variable(node)) => assert_eq!(node.name(), "a"),
        other => panic!("expected the variable node of `a`, got {:?}", other),
    }
    let children = session
        .variables(b_handle, &FormatOptions::default())
        .unwrap();
    assert_eq!(children[0].evaluate_name.as_deref(), Some("a[0]"));
}

#[test]
fn expanding_a_container_registers_its_children() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();
    session.track(&thread("T1"), two_frames(&heap), &LineOverrides::new(), None);

    let frame_handle = session.stack_frames(&thread("T1")).unwrap()[0].id;
    let locals = session
        .variables(frame_handle, &FormatOptions::default())
        .unwrap();
    let k = locals.iter().find(|v| v.name == "k").expect("k");
    let k_handle = k.variables_reference.expect("k is a container");

    let children = session
        .variables(k_handle, &FormatOptions::default())
        .unwrap();
    let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["0", "1"]);
    let paths: Vec<_> = children
        .iter()
        .map(|c| c.evaluate_name.as_deref())
        .collect();
    assert_eq!(paths, vec![Some("k[0]"), Some("k[1]")]);

    let n = locals.iter().find(|v| v.name == "n").expect("n");
    assert_eq!(n.variables_reference, None);
}

#[test]
fn line_overrides_replace_reported_lines() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();
    let mut overrides = LineOverrides::new();
    overrides.insert(ObjectId(2), 99);

    session.track(&thread("T1"), two_frames(&heap), &overrides, None);

    let frames = session.stack_frames(&thread("T1")).unwrap();
    assert_eq!(frames[0].line, 99);
    assert_eq!(frames[1].line, 30);

    let top = session.top_frame_and_line_map(&thread("T1")).unwrap();
    assert_eq!(top.handle, frames[0].id);
    assert_eq!(top.line(), 99);
    assert_eq!(top.frame.function_name(), "work");
}

#[test]
fn untrack_all_is_idempotent_and_clears_everything() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();
    session.track(&thread("T1"), two_frames(&heap), &LineOverrides::new(), None);
    let frame_handle = session.stack_frames(&thread("T1")).unwrap()[0].id;
    assert!(session.handle_count() > 0);

    session.untrack_all();
    session.untrack_all();

    assert!(session.is_untracked());
    assert_eq!(session.handle_count(), 0);
    assert!(session.stack_frames(&thread("T1")).is_none());
    assert!(session.get_variable(frame_handle).is_none());
    assert!(registry.tracker_for(&thread("T1")).is_none());
    assert_eq!(registry.indexed_handles(), 0);
}

#[test]
fn tracking_a_closed_session_is_ignored() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();
    session.untrack_all();

    session.track(&thread("T1"), two_frames(&heap), &LineOverrides::new(), None);

    assert!(session.tracked_ids().is_empty());
    assert!(registry.tracker_for(&thread("T1")).is_none());
}

/// A frame whose caller chain loops back onto itself.
#[derive(Debug)]
struct LoopingFrame {
    me: std::sync::Weak<LoopingFrame>,
}

impl DebugFrame for LoopingFrame {
    fn object_id(&self) -> ObjectId {
        ObjectId(1)
    }

    fn function_name(&self) -> String {
        "spin".to_string()
    }

    fn line(&self) -> u32 {
        1
    }

    fn locals(&self) -> Vec<(String, ValueRef)> {
        Vec::new()
    }

    fn caller(&self) -> Option<FrameRef> {
        self.me.upgrade().map(|frame| frame as FrameRef)
    }
}

#[test]
fn frame_walk_stops_when_a_frame_repeats() {
    let registry = SuspendedFramesRegistry::new();
    let frame: Arc<LoopingFrame> = Arc::new_cyclic(|me| LoopingFrame { me: me.clone() });
    let session = registry.open_session();

    session.track(&thread("T1"), frame, &LineOverrides::new(), None);

    assert_eq!(session.stack_frames(&thread("T1")).unwrap().len(), 1);
}

#[test]
fn tracking_an_id_again_appends_only_new_frames() {
    let dir = TempDir::new().unwrap();
    let logger = Arc::new(StructuredLogger::new("test", dir.path()).unwrap());
    let registry = SuspendedFramesRegistry::builder(RegistryConfig::default())
        .diagnostics(logger)
        .build();
    let heap = Heap::new();
    let top = two_frames(&heap);
    let session = registry.open_session();

    session.track(&thread("T1"), Arc::clone(&top), &LineOverrides::new(), None);
    session.track(&thread("T1"), top, &LineOverrides::new(), None);

    assert_eq!(session.stack_frames(&thread("T1")).unwrap().len(), 2);
    assert!(Arc::ptr_eq(
        &registry.tracker_for(&thread("T1")).unwrap(),
        session.tracker()
    ));

    let events: Vec<LogEntry> = std::fs::read_to_string(dir.path().join("events.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let double_tracks: Vec<_> = events
        .iter()
        .filter(|e| e.event["type"] == "DoubleTrack")
        .collect();
    assert_eq!(double_tracks.len(), 1);
    assert_eq!(double_tracks[0].event["execution_id"], "T1");
}

#[test]
fn sub_executions_keep_the_real_thread() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let task_frame = HeapFrame::new(ObjectId(10), "task", 3).into_ref();
    let session = registry.open_session();

    session.track(&thread("T1"), two_frames(&heap), &LineOverrides::new(), None);
    session.track(&thread("T1"), task_frame, &LineOverrides::new(), Some(&thread("task-1")));

    assert_eq!(session.tracked_ids(), vec![thread("T1"), thread("task-1")]);
    assert_eq!(session.main_thread_id(), Some(thread("T1")));
    let task_handle = session.stack_frames(&thread("task-1")).unwrap()[0].id;
    assert_eq!(session.thread_for_frame(task_handle), Some(thread("T1")));
    assert!(session.find_frame(&thread("T1"), task_handle).is_some());
    assert!(session.find_frame(&thread("task-1"), task_handle).is_some());
    assert!(session.find_frame(&thread("T2"), task_handle).is_none());
}

#[test]
fn obtain_as_variable_reuses_known_values() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let k = heap.list(&[heap.int(1)]);
    let frame = HeapFrame::new(ObjectId(1), "f", 1)
        .with_local("k", Arc::clone(&k))
        .into_ref();
    let session = registry.open_session();
    session.track(&thread("T1"), frame, &LineOverrides::new(), None);

    let known = session.obtain_as_variable("alias", k, None).unwrap();
    assert_eq!(known.name(), "k");

    let result = session
        .obtain_as_variable("result", heap.dict(&[]), None)
        .unwrap();
    assert_eq!(result.evaluate_name(), Some("result"));
    assert!(matches!(
        session.get_variable(result.handle()),
        Some(Node::Variable(_))
    ));

    let custom = session
        .obtain_as_variable("x", heap.int(3), Some("obj.x".to_string()))
        .unwrap();
    assert_eq!(custom.evaluate_name(), Some("obj.x"));
}

#[test]
fn suspend_command_uses_the_top_frame_and_its_line() {
    let registry = SuspendedFramesRegistry::new();
    let heap = Heap::new();
    let session = registry.open_session();
    let mut overrides = LineOverrides::new();
    overrides.insert(ObjectId(2), 41);
    session.track(&thread("T1"), two_frames(&heap), &overrides, None);

    let event = session
        .create_thread_suspend_command(
            &StoppedEventFactory,
            &thread("T1"),
            &SuspendDetails::new(StopReason::Exception),
        )
        .unwrap();
    assert_eq!(event.reason, StopReason::Exception);
    assert_eq!(event.top_frame.name, "work");
    assert_eq!(event.top_frame.line, 41);

    let err = session
        .create_thread_suspend_command(
            &StoppedEventFactory,
            &thread("T9"),
            &SuspendDetails::new(StopReason::Pause),
        )
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::UnknownThread {
            thread_id: thread("T9")
        }
    );
}
