use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bvm_wire::{BreakpointId, FunctionId, ProcessId};

use crate::backtrace::{BackTrace, BackTraceFrame};
use crate::value::RemoteObject;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub function_id: FunctionId,
    pub function_name: String,
    pub bytecode_index: u32,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} @{}",
            self.id, self.function_name, self.bytecode_index
        )
    }
}

/// Per-session debugger context.
///
/// The backtrace, top frame and uncaught exception caches describe the most
/// recent stop only and are dropped by [`DebugState::reset`] whenever a new
/// stop event is handled.
#[derive(Debug, Default)]
pub struct DebugState {
    pub current_process: Option<ProcessId>,
    pub current_backtrace: Option<Arc<BackTrace>>,
    pub top_frame: Option<BackTraceFrame>,
    pub breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    /// Index into the visible frames of the cached backtrace.
    pub current_frame: usize,
    pub current_uncaught_exception: Option<RemoteObject>,
    pub show_internal_frames: bool,
    pub verbose: bool,
}

impl DebugState {
    pub fn new(show_internal_frames: bool, verbose: bool) -> Self {
        Self {
            show_internal_frames,
            verbose,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.current_backtrace = None;
        self.top_frame = None;
        self.current_frame = 0;
        self.current_uncaught_exception = None;
    }

    /// Flips the internal-frames toggle and recomputes visibility of the
    /// cached backtrace.
    pub fn toggle_internal_frames(&mut self) -> bool {
        self.show_internal_frames = !self.show_internal_frames;
        if let Some(backtrace) = self.current_backtrace.as_mut() {
            Arc::make_mut(backtrace).set_show_internal(self.show_internal_frames);
            if backtrace.visible_frame(self.current_frame).is_none() {
                self.current_frame = 0;
            }
        }
        self.show_internal_frames
    }

    pub fn toggle_verbose(&mut self) -> bool {
        self.verbose = !self.verbose;
        self.verbose
    }
}
