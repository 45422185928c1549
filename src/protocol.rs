//! Response bodies handed to the protocol layer.
//!
//! Field names follow the debug adapter protocol wire form (camelCase,
//! `variablesReference` omitted for non-containers).

use crate::handle::Handle;
use crate::value::{ExecutionId, FrameRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresentationAttribute {
    RawString,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationHint {
    pub attributes: Vec<PresentationAttribute>,
}

/// One entry of a variables listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableData {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate_name: Option<String>,
    /// Set only for containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<Handle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<PresentationHint>,
}

impl VariableData {
    pub fn has_attribute(&self, attribute: PresentationAttribute) -> bool {
        self.presentation_hint
            .as_ref()
            .map(|hint| hint.attributes.contains(&attribute))
            .unwrap_or(false)
    }
}

/// One entry of a stack trace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameInfo {
    pub id: Handle,
    pub name: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Topmost frame of a suspended execution and the line overrides of its
/// session.
#[derive(Debug, Clone)]
pub struct TopFrame {
    pub frame: FrameRef,
    pub handle: Handle,
    pub line_overrides: HashMap<Handle, u32>,
}

impl TopFrame {
    /// Reported line of the topmost frame.
    pub fn line(&self) -> u32 {
        self.line_overrides
            .get(&self.handle)
            .copied()
            .unwrap_or_else(|| self.frame.line())
    }

    pub fn info(&self) -> StackFrameInfo {
        StackFrameInfo {
            id: self.handle,
            name: self.frame.function_name(),
            line: self.line(),
            source: self.frame.source_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Breakpoint,
    Step,
    Exception,
    Pause,
    Entry,
    Goto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendDetails {
    pub reason: StopReason,
    #[serde(default)]
    pub description: Option<String>,
}

impl SuspendDetails {
    pub fn new(reason: StopReason) -> Self {
        Self {
            reason,
            description: None,
        }
    }
}

/// Builds the wire message announcing that a thread stopped.
pub trait CommandFactory {
    type Command;

    fn make_thread_suspend_message(
        &self,
        thread_id: &ExecutionId,
        top: &TopFrame,
        details: &SuspendDetails,
    ) -> Self::Command;
}

/// `stopped` event body, extended with the topmost frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEvent {
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub thread_id: ExecutionId,
    pub all_threads_stopped: bool,
    pub top_frame: StackFrameInfo,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoppedEventFactory;

impl CommandFactory for StoppedEventFactory {
    type Command = StoppedEvent;

    fn make_thread_suspend_message(
        &self,
        thread_id: &ExecutionId,
        top: &TopFrame,
        details: &SuspendDetails,
    ) -> StoppedEvent {
        StoppedEvent {
            reason: details.reason,
            description: details.description.clone(),
            thread_id: thread_id.clone(),
            all_threads_stopped: false,
            top_frame: top.info(),
        }
    }
}
