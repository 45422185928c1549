//! Process-wide registry of suspended frames.
//!
//! The registry routes protocol requests (a thread id or a handle) to the
//! [`SessionTracker`] that owns them. Sessions are opened with
//! [`SuspendedFramesRegistry::open_session`], which returns a guard that
//! closes the session when dropped, so a suspend episode cannot leak its
//! handles even if the code driving it bails out early.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::format::{FormatOptions, ReprFormatter, ValueFormatter};
use crate::handle::{Handle, HandleAllocator};
use crate::node::{InspectContext, Node, VariableNode};
use crate::protocol::{StackFrameInfo, TopFrame, VariableData};
use crate::resolver::ResolverTable;
use crate::structured_logger::StructuredLogger;
use crate::tracker::SessionTracker;
use crate::value::{ExecutionId, FrameRef};
use anyhow::Context;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Routing tables shared with every tracker.
#[derive(Default)]
pub(crate) struct RegistryIndex {
    pub(crate) thread_to_tracker: HashMap<ExecutionId, Arc<SessionTracker>>,
    pub(crate) handle_to_tracker: HashMap<Handle, Arc<SessionTracker>>,
}

/// State a tracker needs from its registry.
pub(crate) struct RegistryShared {
    pub(crate) index: RwLock<RegistryIndex>,
    pub(crate) allocator: HandleAllocator,
    diagnostics: Option<Arc<StructuredLogger>>,
}

impl RegistryShared {
    pub(crate) fn diagnostics(&self) -> Option<&StructuredLogger> {
        self.diagnostics.as_deref()
    }
}

/// Supplies the frame currently executing on a thread, for the wildcard
/// frame id.
pub trait CurrentFrameSource: Send + Sync {
    fn current_frame(&self, thread_id: &ExecutionId) -> anyhow::Result<Option<FrameRef>>;
}

pub struct RegistryBuilder {
    config: RegistryConfig,
    resolvers: ResolverTable,
    formatter: Option<Arc<dyn ValueFormatter>>,
    current_frames: Option<Arc<dyn CurrentFrameSource>>,
    diagnostics: Option<Arc<StructuredLogger>>,
}

impl RegistryBuilder {
    pub fn resolvers(mut self, resolvers: ResolverTable) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Overrides the default [`ReprFormatter`].
    pub fn formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn current_frame_source(mut self, source: Arc<dyn CurrentFrameSource>) -> Self {
        self.current_frames = Some(source);
        self
    }

    /// Uses `logger` instead of opening one from `diagnostics.events_dir`.
    pub fn diagnostics(mut self, logger: Arc<StructuredLogger>) -> Self {
        self.diagnostics = Some(logger);
        self
    }

    pub fn build(self) -> SuspendedFramesRegistry {
        let registry_id = Uuid::new_v4().to_string();
        let diagnostics = self.diagnostics.or_else(|| {
            let dir = self.config.diagnostics.events_dir.as_ref()?;
            match StructuredLogger::new(&registry_id, dir) {
                Ok(logger) => Some(Arc::new(logger)),
                Err(e) => {
                    tracing::warn!(
                        events_dir = %dir.display(),
                        error = %e,
                        "could not open diagnostics log, continuing without it"
                    );
                    None
                }
            }
        });
        let formatter = self
            .formatter
            .unwrap_or_else(|| Arc::new(ReprFormatter::new(&self.config.formatting)));

        SuspendedFramesRegistry {
            shared: Arc::new(RegistryShared {
                index: RwLock::new(RegistryIndex::default()),
                allocator: HandleAllocator::new(),
                diagnostics,
            }),
            ctx: Arc::new(InspectContext {
                config: self.config,
                resolvers: self.resolvers,
                formatter,
            }),
            fabricated: RwLock::new(HashMap::new()),
            current_frames: self.current_frames,
        }
    }
}

/// Routes thread ids and handles to the session that owns them.
pub struct SuspendedFramesRegistry {
    shared: Arc<RegistryShared>,
    ctx: Arc<InspectContext>,
    /// Synthetic frames (e.g. from console evaluation) per thread.
    fabricated: RwLock<HashMap<ExecutionId, HashMap<i64, FrameRef>>>,
    current_frames: Option<Arc<dyn CurrentFrameSource>>,
}

impl SuspendedFramesRegistry {
    pub fn new() -> Self {
        Self::builder(RegistryConfig::default()).build()
    }

    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            resolvers: ResolverTable::new(),
            formatter: None,
            current_frames: None,
            diagnostics: None,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &Arc<InspectContext> {
        &self.ctx
    }

    /// Opens a session for one suspend episode.
    pub fn open_session(&self) -> TrackedSession {
        let tracker = SessionTracker::new(Arc::clone(&self.shared), Arc::clone(&self.ctx));
        tracing::debug!(session = %tracker.session_id(), "session opened");
        if let Some(log) = self.shared.diagnostics() {
            log.log_session_opened(tracker.session_id());
        }
        TrackedSession { tracker }
    }

    /// Runs `f` with a fresh session and closes it afterwards, however `f`
    /// exits.
    pub fn with_session<R>(&self, f: impl FnOnce(&SessionTracker) -> R) -> R {
        let session = self.open_session();
        f(&session)
    }

    /// Closes the session tracking `thread_id`. Returns whether one existed.
    ///
    /// A real thread that was only suspended through sub-executions is not
    /// listed under its own id, so sessions whose main thread is `thread_id`
    /// are closed too.
    pub fn on_resume(&self, thread_id: &ExecutionId) -> bool {
        let owners = match self.tracker_for(thread_id) {
            Some(tracker) => vec![tracker],
            None => self.trackers_of_main_thread(thread_id),
        };
        if owners.is_empty() {
            return false;
        }
        for tracker in owners {
            tracker.untrack_all();
        }
        true
    }

    /// Distinct active sessions whose real thread is `thread_id`.
    fn trackers_of_main_thread(&self, thread_id: &ExecutionId) -> Vec<Arc<SessionTracker>> {
        self.active_trackers()
            .into_iter()
            .filter(|tracker| tracker.main_thread_id().as_ref() == Some(thread_id))
            .collect()
    }

    pub fn tracker_for(&self, thread_id: &ExecutionId) -> Option<Arc<SessionTracker>> {
        self.shared
            .index
            .read()
            .thread_to_tracker
            .get(thread_id)
            .cloned()
    }

    /// Session owning `handle`.
    ///
    /// Falls back to asking every active session when the handle index has no
    /// entry; a hit on that path is logged because it means the index drifted.
    pub fn route(&self, handle: Handle) -> Option<Arc<SessionTracker>> {
        let indexed = self
            .shared
            .index
            .read()
            .handle_to_tracker
            .get(&handle)
            .cloned();
        if indexed.is_some() {
            return indexed;
        }

        let tracker = self
            .active_trackers()
            .into_iter()
            .find(|tracker| tracker.get_variable(handle).is_some())?;
        tracing::warn!(
            handle = %handle,
            session = %tracker.session_id(),
            "handle missing from index, found by scanning sessions"
        );
        if let Some(log) = self.shared.diagnostics() {
            log.log_index_miss(handle, tracker.session_id());
        }
        Some(tracker)
    }

    /// Real thread that must be used to inspect `handle`.
    ///
    /// For a frame of a sub-execution this is the thread the sub-execution
    /// was suspended on, never the sub-execution id itself.
    pub fn thread_for_handle(&self, handle: Handle) -> Option<ExecutionId> {
        let tracker = self.route(handle)?;
        tracker
            .thread_for_frame(handle)
            .or_else(|| tracker.main_thread_id())
    }

    pub fn get_variable(&self, handle: Handle) -> RegistryResult<Node> {
        self.route(handle)
            .and_then(|tracker| tracker.get_variable(handle))
            .ok_or(RegistryError::NotFound { handle })
    }

    pub fn children(
        &self,
        handle: Handle,
        fmt: &FormatOptions,
    ) -> RegistryResult<Vec<Arc<VariableNode>>> {
        self.route(handle)
            .and_then(|tracker| tracker.children(handle, fmt))
            .ok_or(RegistryError::NotFound { handle })
    }

    /// Rendered children of a frame or container handle.
    pub fn variables(&self, handle: Handle, fmt: &FormatOptions) -> RegistryResult<Vec<VariableData>> {
        self.route(handle)
            .and_then(|tracker| tracker.variables(handle, fmt))
            .ok_or(RegistryError::NotFound { handle })
    }

    pub fn stack_trace(&self, thread_id: &ExecutionId) -> RegistryResult<Vec<StackFrameInfo>> {
        self.tracker_for(thread_id)
            .and_then(|tracker| tracker.stack_frames(thread_id))
            .ok_or_else(|| RegistryError::UnknownThread {
                thread_id: thread_id.clone(),
            })
    }

    pub fn top_frame_and_line_map(&self, thread_id: &ExecutionId) -> Option<TopFrame> {
        self.tracker_for(thread_id)?
            .top_frame_and_line_map(thread_id)
    }

    /// Registers a synthetic frame under an explicit id for `thread_id`.
    pub fn add_fabricated_frame(&self, thread_id: &ExecutionId, frame_id: i64, frame: FrameRef) {
        self.fabricated
            .write()
            .entry(thread_id.clone())
            .or_default()
            .insert(frame_id, frame);
    }

    /// Drops every synthetic frame of `thread_id`, returning how many there were.
    pub fn remove_fabricated_frames(&self, thread_id: &ExecutionId) -> usize {
        self.fabricated
            .write()
            .remove(thread_id)
            .map(|frames| frames.len())
            .unwrap_or(0)
    }

    /// Resolves a client frame id for `thread_id`.
    ///
    /// The configured wildcard means "whatever frame is executing now";
    /// otherwise the id is parsed as an integer and looked up in the
    /// synthetic frames first, then in the thread's session. Failures are
    /// logged and reported as `None`.
    pub fn find_frame(&self, thread_id: &ExecutionId, frame_id: &str) -> Option<FrameRef> {
        match self.lookup_frame(thread_id, frame_id) {
            Ok(frame) => frame,
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::error!(
                    thread_id = %thread_id,
                    frame_id,
                    error = %error,
                    "frame lookup failed"
                );
                if let Some(log) = self.shared.diagnostics() {
                    log.log_frame_lookup_failed(thread_id, frame_id, &error);
                }
                None
            }
        }
    }

    fn lookup_frame(
        &self,
        thread_id: &ExecutionId,
        frame_id: &str,
    ) -> anyhow::Result<Option<FrameRef>> {
        if frame_id == self.ctx.config.wildcard_frame_id {
            return match &self.current_frames {
                Some(source) => source
                    .current_frame(thread_id)
                    .with_context(|| format!("current frame of thread {}", thread_id)),
                None => {
                    tracing::debug!(thread_id = %thread_id, "no current frame source configured");
                    Ok(None)
                }
            };
        }

        let id: i64 = frame_id
            .trim()
            .parse()
            .map_err(|_| RegistryError::InvalidFrameId {
                raw: frame_id.to_string(),
            })?;

        let fabricated = self
            .fabricated
            .read()
            .get(thread_id)
            .and_then(|frames| frames.get(&id))
            .cloned();
        if fabricated.is_some() {
            return Ok(fabricated);
        }

        Ok(self
            .tracker_for(thread_id)
            .and_then(|tracker| tracker.find_frame(thread_id, Handle::from_raw(id))))
    }

    /// Number of distinct sessions currently tracking at least one id.
    pub fn active_sessions(&self) -> usize {
        self.active_trackers().len()
    }

    /// Distinct sessions listed in the thread index. The index lock is
    /// released before returning, so callers may lock the trackers.
    fn active_trackers(&self) -> Vec<Arc<SessionTracker>> {
        let index = self.shared.index.read();
        let mut trackers: Vec<Arc<SessionTracker>> = Vec::new();
        for tracker in index.thread_to_tracker.values() {
            if !trackers.iter().any(|seen| Arc::ptr_eq(seen, tracker)) {
                trackers.push(Arc::clone(tracker));
            }
        }
        trackers
    }

    /// Number of handles currently routable through the index.
    pub fn indexed_handles(&self) -> usize {
        self.shared.index.read().handle_to_tracker.len()
    }
}

impl Default for SuspendedFramesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SuspendedFramesRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendedFramesRegistry")
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

/// Guard over an open session. Dropping it untracks everything the session
/// tracked.
#[must_use = "dropping the guard closes the session immediately"]
#[derive(Debug)]
pub struct TrackedSession {
    tracker: Arc<SessionTracker>,
}

impl TrackedSession {
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }
}

impl Deref for TrackedSession {
    type Target = SessionTracker;

    fn deref(&self) -> &SessionTracker {
        &self.tracker
    }
}

impl Drop for TrackedSession {
    fn drop(&mut self) {
        self.tracker.untrack_all();
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
