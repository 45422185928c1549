//! Replays a recorded suspend episode against a registry.
//!
//! A script is a JSON document with a heap of objects, a set of frames over
//! that heap and a list of protocol steps. Each step produces one JSON result
//! line, so a script plus its expected output makes a regression fixture.

use crate::format::FormatOptions;
use crate::handle::Handle;
use crate::protocol::{StopReason, StoppedEventFactory, SuspendDetails};
use crate::registry::{
    CurrentFrameSource, RegistryBuilder, SuspendedFramesRegistry, TrackedSession,
};
use crate::snapshot::{Heap, HeapFrame, ObjectData};
use crate::value::{ExecutionId, FrameRef, LineOverrides, ObjectId};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectSpec {
    pub id: ObjectId,
    #[serde(flatten)]
    pub data: ObjectData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FrameSpec {
    pub id: ObjectId,
    pub function: String,
    pub line: u32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub locals: BTreeMap<String, ObjectId>,
    #[serde(default)]
    pub caller: Option<ObjectId>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Suspend {
        thread: ExecutionId,
        top: ObjectId,
        #[serde(default)]
        sub_execution: Option<ExecutionId>,
        /// Frame id (as a string key) to reported line.
        #[serde(default)]
        line_overrides: BTreeMap<String, u32>,
        #[serde(default)]
        reason: Option<StopReason>,
    },
    Resume {
        thread: ExecutionId,
    },
    StackTrace {
        thread: ExecutionId,
    },
    Variables {
        #[serde(default)]
        reference: Option<i64>,
        #[serde(default)]
        thread: Option<ExecutionId>,
        /// Index into the thread's stack trace.
        #[serde(default)]
        frame: Option<usize>,
        /// Child names to descend through from the frame.
        #[serde(default)]
        path: Vec<String>,
        #[serde(default)]
        format: FormatOptions,
    },
    ThreadForReference {
        reference: i64,
    },
    FindFrame {
        thread: ExecutionId,
        frame_id: String,
    },
    AddFabricatedFrame {
        thread: ExecutionId,
        frame_id: i64,
        frame: ObjectId,
    },
    RemoveFabricatedFrames {
        thread: ExecutionId,
    },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid replay script: {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse replay script as JSON")
    }
}

/// Frame currently executing on each suspended thread, for wildcard lookups.
#[derive(Default)]
struct ExecutingFrames {
    by_thread: RwLock<HashMap<ExecutionId, FrameRef>>,
}

impl CurrentFrameSource for ExecutingFrames {
    fn current_frame(&self, thread_id: &ExecutionId) -> Result<Option<FrameRef>> {
        Ok(self.by_thread.read().get(thread_id).cloned())
    }
}

/// Drives a registry through the steps of a script.
pub struct Replayer {
    registry: SuspendedFramesRegistry,
    executing: Arc<ExecutingFrames>,
    frames: HashMap<ObjectId, FrameRef>,
    sessions: HashMap<ExecutionId, TrackedSession>,
}

impl Replayer {
    /// Materializes the heap and frames of `script`.
    ///
    /// `builder` is finished here, after the replay's current frame source
    /// has been installed on it.
    pub fn new(script: &Script, builder: RegistryBuilder) -> Result<Self> {
        let heap = Heap::new();
        for object in &script.objects {
            heap.insert(object.id, object.data.clone());
        }
        for object in &script.objects {
            for referenced in object.data.references() {
                if !heap.contains(referenced) {
                    anyhow::bail!(
                        "object {} refers to unknown object {}",
                        object.id,
                        referenced
                    );
                }
            }
        }

        let specs: HashMap<ObjectId, &FrameSpec> =
            script.frames.iter().map(|spec| (spec.id, spec)).collect();
        let mut frames = HashMap::new();
        for spec in &script.frames {
            build_frame(spec.id, &specs, &heap, &mut frames, &mut HashSet::new())?;
        }

        let executing = Arc::new(ExecutingFrames::default());
        let registry = builder
            .current_frame_source(Arc::clone(&executing) as Arc<dyn CurrentFrameSource>)
            .build();

        Ok(Self {
            registry,
            executing,
            frames,
            sessions: HashMap::new(),
        })
    }

    pub fn registry(&self) -> &SuspendedFramesRegistry {
        &self.registry
    }

    /// Runs every step, returning one result object per step.
    ///
    /// Registry lookups that fail produce an `error` result; malformed steps
    /// (unknown frames) abort the replay.
    pub fn run(&mut self, steps: &[Step]) -> Result<Vec<Value>> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                self.apply(step)
                    .with_context(|| format!("step {} failed", index))
            })
            .collect()
    }

    fn frame(&self, id: ObjectId) -> Result<FrameRef> {
        self.frames
            .get(&id)
            .cloned()
            .with_context(|| format!("unknown frame {}", id))
    }

    fn apply(&mut self, step: &Step) -> Result<Value> {
        let result = match step {
            Step::Suspend {
                thread,
                top,
                sub_execution,
                line_overrides,
                reason,
            } => {
                let top_frame = self.frame(*top)?;
                let mut overrides = LineOverrides::new();
                for (frame, line) in line_overrides {
                    let frame: u64 = frame
                        .trim()
                        .parse()
                        .with_context(|| format!("line override key {:?} is not a frame id", frame))?;
                    overrides.insert(ObjectId(frame), *line);
                }

                let session = self
                    .sessions
                    .entry(thread.clone())
                    .or_insert_with(|| self.registry.open_session());
                session.track(thread, Arc::clone(&top_frame), &overrides, sub_execution.as_ref());
                self.executing
                    .by_thread
                    .write()
                    .insert(thread.clone(), top_frame);

                let tracked_id = sub_execution.as_ref().unwrap_or(thread);
                let details = SuspendDetails::new(reason.unwrap_or(StopReason::Breakpoint));
                match session.create_thread_suspend_command(&StoppedEventFactory, tracked_id, &details) {
                    Ok(event) => json!({ "op": "suspend", "stopped": event }),
                    Err(e) => json!({ "op": "suspend", "error": e.to_string() }),
                }
            }
            Step::Resume { thread } => {
                let resumed = self.registry.on_resume(thread);
                self.sessions.remove(thread);
                self.executing.by_thread.write().remove(thread);
                json!({ "op": "resume", "resumed": resumed })
            }
            Step::StackTrace { thread } => match self.registry.stack_trace(thread) {
                Ok(frames) => json!({ "op": "stackTrace", "stackFrames": frames }),
                Err(e) => json!({ "op": "stackTrace", "error": e.to_string() }),
            },
            Step::Variables {
                reference,
                thread,
                frame,
                path,
                format,
            } => {
                let handle = match (reference, thread) {
                    (Some(raw), _) => Some(Handle::from_raw(*raw)),
                    (None, Some(thread)) => {
                        self.resolve_path(thread, frame.unwrap_or(0), path, format)
                    }
                    (None, None) => anyhow::bail!("variables needs a reference or a thread"),
                };
                match handle.map(|handle| self.registry.variables(handle, format)) {
                    Some(Ok(variables)) => json!({ "op": "variables", "variables": variables }),
                    Some(Err(e)) => json!({ "op": "variables", "error": e.to_string() }),
                    None => json!({ "op": "variables", "error": "path did not resolve" }),
                }
            }
            Step::ThreadForReference { reference } => {
                let thread = self.registry.thread_for_handle(Handle::from_raw(*reference));
                json!({ "op": "threadForReference", "threadId": thread })
            }
            Step::FindFrame { thread, frame_id } => {
                let found = self.registry.find_frame(thread, frame_id);
                json!({
                    "op": "findFrame",
                    "function": found.map(|frame| frame.function_name()),
                })
            }
            Step::AddFabricatedFrame {
                thread,
                frame_id,
                frame,
            } => {
                let frame = self.frame(*frame)?;
                self.registry.add_fabricated_frame(thread, *frame_id, frame);
                json!({ "op": "addFabricatedFrame" })
            }
            Step::RemoveFabricatedFrames { thread } => {
                let removed = self.registry.remove_fabricated_frames(thread);
                json!({ "op": "removeFabricatedFrames", "removed": removed })
            }
        };
        Ok(result)
    }

    /// Handle reached by walking `path` from frame `frame_index` of `thread`.
    fn resolve_path(
        &self,
        thread: &ExecutionId,
        frame_index: usize,
        path: &[String],
        fmt: &FormatOptions,
    ) -> Option<Handle> {
        let frames = self.registry.stack_trace(thread).ok()?;
        let mut handle = frames.get(frame_index)?.id;
        for name in path {
            let children = self.registry.children(handle, fmt).ok()?;
            handle = children.iter().find(|child| child.name() == name)?.handle();
        }
        Some(handle)
    }
}

fn build_frame(
    id: ObjectId,
    specs: &HashMap<ObjectId, &FrameSpec>,
    heap: &Arc<Heap>,
    built: &mut HashMap<ObjectId, FrameRef>,
    visiting: &mut HashSet<ObjectId>,
) -> Result<FrameRef> {
    if let Some(frame) = built.get(&id) {
        return Ok(Arc::clone(frame));
    }
    let spec = specs
        .get(&id)
        .with_context(|| format!("unknown frame {}", id))?;
    if !visiting.insert(id) {
        anyhow::bail!("frame {} is its own caller", id);
    }

    let mut frame = HeapFrame::new(spec.id, spec.function.clone(), spec.line);
    if let Some(source) = &spec.source {
        frame = frame.with_source(source.clone());
    }
    for (name, value) in &spec.locals {
        if !heap.contains(*value) {
            anyhow::bail!("local {} of frame {} refers to unknown object {}", name, id, value);
        }
        frame = frame.with_local(name.clone(), heap.value(*value));
    }
    if let Some(caller) = spec.caller {
        frame = frame.with_caller(build_frame(caller, specs, heap, built, visiting)?);
    }

    let frame = frame.into_ref();
    built.insert(id, Arc::clone(&frame));
    Ok(frame)
}

#[cfg(test)]
#[path = "tests/replay_tests.rs"]
mod tests;
