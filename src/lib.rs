//! Suspended-execution state registry for a debugger backend.
//!
//! When the tracing engine halts a thread it opens a session on the
//! [`SuspendedFramesRegistry`] and tracks the thread's frame chain. Every frame
//! and every value reachable from it gets a small integer [`Handle`] that the
//! protocol layer uses to list stack frames and expand variables. Resuming the
//! thread closes the session and invalidates all of its handles.

pub mod config;
pub mod error;
pub mod format;
pub mod handle;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod replay;
pub mod resolver;
pub mod snapshot;
pub mod structured_logger;
pub mod tracker;
pub mod value;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use format::{FormatOptions, ReprFormatter, ValueFormatter};
pub use handle::Handle;
pub use node::{FrameNode, Node, VariableNode};
pub use protocol::{StackFrameInfo, StoppedEvent, StoppedEventFactory, VariableData};
pub use registry::{CurrentFrameSource, SuspendedFramesRegistry, TrackedSession};
pub use tracker::SessionTracker;
pub use value::{DebugFrame, DebugValue, ExecutionId, FrameRef, ObjectId, ValueRef};
