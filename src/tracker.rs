//! Session tracking for one suspend episode.
//!
//! A [`SessionTracker`] owns the snapshot of a suspended thread and of any
//! sub-executions riding on it: the frame chains, line overrides and the
//! handle table of everything reachable from those frames. It is created when
//! the thread suspends and torn down exactly once when it resumes.
//!
//! Every table sits behind one lock. Registry indices are updated while that
//! lock is held, always in the order tracker lock → registry index lock.

use crate::error::{RegistryError, RegistryResult};
use crate::format::FormatOptions;
use crate::handle::{Handle, IdentityKey};
use crate::node::{Binding, FrameNode, InspectContext, Node, VariableNode};
use crate::protocol::{CommandFactory, StackFrameInfo, SuspendDetails, TopFrame, VariableData};
use crate::registry::RegistryShared;
use crate::value::{ExecutionId, FrameRef, LineOverrides, ValueRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

#[derive(Default)]
struct TrackerState {
    /// Released on untrack; `None` afterwards.
    registry: Option<Arc<RegistryShared>>,
    untracked: bool,
    /// Real thread of the suspension (never a sub-execution id).
    main_thread_id: Option<ExecutionId>,
    /// Frame handles per tracked execution id, topmost first.
    thread_frames: HashMap<ExecutionId, Vec<Handle>>,
    frames: HashMap<Handle, Arc<FrameNode>>,
    frame_main_thread: HashMap<Handle, ExecutionId>,
    line_overrides: HashMap<Handle, u32>,
    /// First node registered for each value handle; later aliases of the
    /// same object get their own node but never replace this one.
    variables: HashMap<Handle, Arc<VariableNode>>,
    identities: HashMap<IdentityKey, Handle>,
}

impl TrackerState {
    /// Handle for `key`, minting and indexing a fresh one on first sight.
    fn handle_for(
        &mut self,
        key: IdentityKey,
        registry: &RegistryShared,
        owner: &Arc<SessionTracker>,
    ) -> Handle {
        if let Some(handle) = self.identities.get(&key) {
            return *handle;
        }
        let handle = registry.allocator.mint();
        self.identities.insert(key, handle);
        registry
            .index
            .write()
            .handle_to_tracker
            .insert(handle, Arc::clone(owner));
        handle
    }

    fn register_variable(
        &mut self,
        binding: Binding,
        ctx: &InspectContext,
        registry: &RegistryShared,
        owner: &Arc<SessionTracker>,
    ) -> Arc<VariableNode> {
        let key = IdentityKey::Value(binding.value.object_id());
        let handle = self.handle_for(key, registry, owner);
        let is_container = ctx.resolvers.is_container(binding.value.as_ref());
        let node = Arc::new(VariableNode::new(binding, handle, is_container));
        self.variables
            .entry(handle)
            .or_insert_with(|| Arc::clone(&node));
        node
    }
}

/// Snapshot and handle table of one suspend episode.
pub struct SessionTracker {
    session_id: Uuid,
    me: Weak<SessionTracker>,
    ctx: Arc<InspectContext>,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub(crate) fn new(registry: Arc<RegistryShared>, ctx: Arc<InspectContext>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            session_id: Uuid::new_v4(),
            me: me.clone(),
            ctx,
            state: Mutex::new(TrackerState {
                registry: Some(registry),
                ..TrackerState::default()
            }),
        })
    }

    /// Id used to correlate log records of this session.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Tracks the frame chain of a suspended thread or sub-execution.
    ///
    /// `thread_id` is always the real thread. When `sub_execution_id` is
    /// given, the chain is listed under that id instead, but its frames still
    /// route to `thread_id` for inspection. `line_overrides` replace the
    /// reported line of individual frames. Tracking an id that already has an
    /// active tracker (this one included) is a double track: it is logged, the
    /// id is taken over and the frames it does not list yet are appended.
    pub fn track(
        &self,
        thread_id: &ExecutionId,
        top_frame: FrameRef,
        line_overrides: &LineOverrides,
        sub_execution_id: Option<&ExecutionId>,
    ) {
        let effective_id = sub_execution_id.unwrap_or(thread_id).clone();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.untracked {
            tracing::warn!(
                session = %self.session_id,
                thread_id = %effective_id,
                "ignoring track on a session that was already closed"
            );
            return;
        }
        let (Some(registry), Some(owner)) = (state.registry.clone(), self.me.upgrade()) else {
            return;
        };

        let previous = registry
            .index
            .write()
            .thread_to_tracker
            .insert(effective_id.clone(), Arc::clone(&owner));
        if let Some(previous) = previous {
            tracing::warn!(
                session = %self.session_id,
                previous_session = %previous.session_id(),
                thread_id = %effective_id,
                "thread tracked twice without an intervening resume"
            );
            if let Some(log) = registry.diagnostics() {
                log.log_double_track(self.session_id, &effective_id, previous.session_id());
            }
        }
        state.thread_frames.entry(effective_id.clone()).or_default();
        state.main_thread_id = Some(thread_id.clone());

        let mut frame_handles = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(top_frame);
        while let Some(frame) = next {
            let frame_key = frame.object_id();
            if !seen.insert(frame_key) {
                tracing::warn!(
                    session = %self.session_id,
                    thread_id = %effective_id,
                    frame = %frame_key,
                    "frame chain revisits a frame, stopping walk"
                );
                break;
            }
            next = frame.caller();

            let handle = state.handle_for(IdentityKey::Frame(frame_key), &registry, &owner);
            if let Some(line) = line_overrides.get(&frame_key) {
                state.line_overrides.insert(handle, *line);
            }
            let node = FrameNode::new(frame, handle, &self.ctx, |binding| {
                state.register_variable(binding, &self.ctx, &registry, &owner)
            });
            state.frames.insert(handle, Arc::new(node));
            state.frame_main_thread.insert(handle, thread_id.clone());
            frame_handles.push(handle);
        }

        tracing::debug!(
            session = %self.session_id,
            thread_id = %effective_id,
            frames = frame_handles.len(),
            "tracked suspended frames"
        );
        if let Some(log) = registry.diagnostics() {
            log.log_frames_tracked(self.session_id, thread_id, &effective_id, frame_handles.len());
        }
        let listed = state.thread_frames.entry(effective_id).or_default();
        for handle in frame_handles {
            if !listed.contains(&handle) {
                listed.push(handle);
            }
        }
    }

    /// Closes the session: unregisters every id and handle from the registry
    /// and clears all tables.
    ///
    /// Safe to call any number of times; resume notifications and forced
    /// re-suspends (e.g. jumping to another statement) both end up here.
    pub fn untrack_all(&self) {
        let mut guard = self.state.lock();
        if guard.untracked {
            return;
        }
        let state = std::mem::take(&mut *guard);
        guard.untracked = true;

        let released = state.identities.len();
        if let Some(registry) = state.registry {
            {
                let mut index = registry.index.write();
                for id in state.thread_frames.keys() {
                    if index
                        .thread_to_tracker
                        .get(id)
                        .is_some_and(|owner| std::ptr::eq(Arc::as_ptr(owner), self))
                    {
                        index.thread_to_tracker.remove(id);
                    }
                }
                for handle in state.identities.values() {
                    if index
                        .handle_to_tracker
                        .get(handle)
                        .is_some_and(|owner| std::ptr::eq(Arc::as_ptr(owner), self))
                    {
                        index.handle_to_tracker.remove(handle);
                    }
                }
            }
            if let Some(log) = registry.diagnostics() {
                log.log_session_closed(self.session_id, released);
            }
        }
        tracing::debug!(session = %self.session_id, released, "session closed");
    }

    pub fn is_untracked(&self) -> bool {
        self.state.lock().untracked
    }

    /// Real thread whose suspension this session tracks.
    pub fn main_thread_id(&self) -> Option<ExecutionId> {
        self.state.lock().main_thread_id.clone()
    }

    /// Every thread and sub-execution id tracked by this session, sorted.
    pub fn tracked_ids(&self) -> Vec<ExecutionId> {
        let mut ids: Vec<ExecutionId> = self.state.lock().thread_frames.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live handles (frames and values).
    pub fn handle_count(&self) -> usize {
        self.state.lock().identities.len()
    }

    pub fn top_frame_and_line_map(&self, id: &ExecutionId) -> Option<TopFrame> {
        let state = self.state.lock();
        let handle = *state.thread_frames.get(id)?.first()?;
        let node = state.frames.get(&handle)?;
        Some(TopFrame {
            frame: Arc::clone(node.frame()),
            handle,
            line_overrides: state.line_overrides.clone(),
        })
    }

    /// Frames of `id`, topmost first, with their reported lines.
    pub fn stack_frames(&self, id: &ExecutionId) -> Option<Vec<StackFrameInfo>> {
        let state = self.state.lock();
        let handles = state.thread_frames.get(id)?;
        let frames = handles
            .iter()
            .filter_map(|handle| {
                let frame = state.frames.get(handle)?.frame();
                Some(StackFrameInfo {
                    id: *handle,
                    name: frame.function_name(),
                    line: state
                        .line_overrides
                        .get(handle)
                        .copied()
                        .unwrap_or_else(|| frame.line()),
                    source: frame.source_path(),
                })
            })
            .collect();
        Some(frames)
    }

    /// Frame `handle` if it was tracked for `thread_id`, either as its own
    /// chain or as the real thread of a sub-execution.
    pub fn find_frame(&self, thread_id: &ExecutionId, handle: Handle) -> Option<FrameRef> {
        let state = self.state.lock();
        let listed = state
            .thread_frames
            .get(thread_id)
            .is_some_and(|handles| handles.contains(&handle));
        let owned = state.frame_main_thread.get(&handle) == Some(thread_id);
        if !listed && !owned {
            return None;
        }
        state
            .frames
            .get(&handle)
            .map(|node| Arc::clone(node.frame()))
    }

    /// Real thread that must be used to inspect frame `handle`.
    pub fn thread_for_frame(&self, handle: Handle) -> Option<ExecutionId> {
        self.state.lock().frame_main_thread.get(&handle).cloned()
    }

    pub fn get_variable(&self, handle: Handle) -> Option<Node> {
        let state = self.state.lock();
        if let Some(frame) = state.frames.get(&handle) {
            return Some(Node::Frame(Arc::clone(frame)));
        }
        state
            .variables
            .get(&handle)
            .map(|variable| Node::Variable(Arc::clone(variable)))
    }

    /// Children of a frame (its locals) or of a container value.
    pub fn children(&self, handle: Handle, fmt: &FormatOptions) -> Option<Vec<Arc<VariableNode>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.untracked {
            return None;
        }
        if let Some(frame) = state.frames.get(&handle) {
            return Some(frame.locals().to_vec());
        }
        let node = Arc::clone(state.variables.get(&handle)?);
        let registry = state.registry.clone()?;
        let owner = self.me.upgrade()?;
        Some(node.children(&self.ctx, fmt, |binding| {
            state.register_variable(binding, &self.ctx, &registry, &owner)
        }))
    }

    /// Rendered children of a frame or container.
    pub fn variables(&self, handle: Handle, fmt: &FormatOptions) -> Option<Vec<VariableData>> {
        let children = self.children(handle, fmt)?;
        Some(
            children
                .iter()
                .map(|child| child.display(&self.ctx, fmt))
                .collect(),
        )
    }

    /// Registers a value obtained outside the frame walk (e.g. an evaluation
    /// result) so that it can be expanded by handle.
    ///
    /// A value already known to the session yields its existing node. The
    /// evaluable path defaults to `name`.
    pub fn obtain_as_variable(
        &self,
        name: &str,
        value: ValueRef,
        evaluate_name: Option<String>,
    ) -> Option<Arc<VariableNode>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.untracked {
            return None;
        }
        let key = IdentityKey::Value(value.object_id());
        if let Some(existing) = state
            .identities
            .get(&key)
            .and_then(|handle| state.variables.get(handle))
        {
            return Some(Arc::clone(existing));
        }
        let registry = state.registry.clone()?;
        let owner = self.me.upgrade()?;
        let evaluate_name = evaluate_name.unwrap_or_else(|| name.to_string());
        let binding = Binding::new(name, value).with_evaluate_name(Some(evaluate_name));
        Some(state.register_variable(binding, &self.ctx, &registry, &owner))
    }

    /// Builds the "stopped" message for `thread_id` through `factory`.
    pub fn create_thread_suspend_command<F: CommandFactory>(
        &self,
        factory: &F,
        thread_id: &ExecutionId,
        details: &SuspendDetails,
    ) -> RegistryResult<F::Command> {
        let top = self
            .top_frame_and_line_map(thread_id)
            .ok_or_else(|| RegistryError::UnknownThread {
                thread_id: thread_id.clone(),
            })?;
        Ok(factory.make_thread_suspend_message(thread_id, &top, details))
    }
}

impl fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTracker")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;
