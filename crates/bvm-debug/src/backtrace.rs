use std::sync::Arc;

use bvm_wire::FunctionId;

use crate::program::{FunctionInfo, ProgramSymbols, SourceLocation};
use crate::scope::Scope;

/// A function as seen from a stack frame. Ids the symbol table does not know
/// degrade to [`FunctionRef::Missing`] instead of failing.
#[derive(Clone, Debug)]
pub enum FunctionRef {
    Known(Arc<FunctionInfo>),
    Missing { id: FunctionId },
}

impl FunctionRef {
    pub const MISSING_NAME: &'static str = "<unknown function>";

    pub fn resolve(program: &(impl ProgramSymbols + ?Sized), id: FunctionId) -> Self {
        match program.function(id) {
            Some(function) => Self::Known(function),
            None => {
                tracing::debug!(target: "bvm.debug", function_id = id, "function not in symbol table");
                Self::Missing { id }
            }
        }
    }

    pub fn id(&self) -> FunctionId {
        match self {
            Self::Known(function) => function.id,
            Self::Missing { id } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Known(function) => &function.name,
            Self::Missing { .. } => Self::MISSING_NAME,
        }
    }

    pub fn info(&self) -> Option<&FunctionInfo> {
        match self {
            Self::Known(function) => Some(&**function),
            Self::Missing { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BackTraceFrame {
    pub function: FunctionRef,
    pub bytecode_index: u32,
}

impl BackTraceFrame {
    pub fn new(function: FunctionRef, bytecode_index: u32) -> Self {
        Self {
            function,
            bytecode_index,
        }
    }

    pub fn function_id(&self) -> FunctionId {
        self.function.id()
    }

    pub fn source_location(&self) -> Option<SourceLocation> {
        self.function.info()?.location_at(self.bytecode_index)
    }

    /// Bytecode index of the next distinct source position in this function.
    pub fn step_target(&self) -> Option<u32> {
        self.function.info()?.next_step_target(self.bytecode_index)
    }

    pub fn scope(&self) -> Scope {
        self.function
            .info()
            .map(|function| function.scope_at(self.bytecode_index))
            .unwrap_or_default()
    }

    /// Unresolved functions stay visible so the user still sees them.
    pub fn is_visible(&self, show_internal: bool) -> bool {
        show_internal || !self.function.info().is_some_and(FunctionInfo::is_internal)
    }

    /// Same function and same bytecode position.
    pub fn same_position(&self, other: &BackTraceFrame) -> bool {
        self.function_id() == other.function_id() && self.bytecode_index == other.bytecode_index
    }
}

/// Stack frames, innermost first, plus the index map of the frames currently
/// considered visible.
#[derive(Clone, Debug)]
pub struct BackTrace {
    frames: Vec<BackTraceFrame>,
    visible: Vec<usize>,
}

impl BackTrace {
    pub fn new(frames: Vec<BackTraceFrame>, show_internal: bool) -> Self {
        let mut backtrace = Self {
            frames,
            visible: Vec::new(),
        };
        backtrace.set_show_internal(show_internal);
        backtrace
    }

    /// Resolves parallel function-id / bytecode-index arrays.
    pub fn from_wire(
        program: &(impl ProgramSymbols + ?Sized),
        function_ids: &[FunctionId],
        bytecode_indices: &[u32],
        show_internal: bool,
    ) -> Self {
        let frames = function_ids
            .iter()
            .zip(bytecode_indices)
            .map(|(id, bci)| BackTraceFrame::new(FunctionRef::resolve(program, *id), *bci))
            .collect();
        Self::new(frames, show_internal)
    }

    pub fn set_show_internal(&mut self, show_internal: bool) {
        self.visible = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.is_visible(show_internal))
            .map(|(index, _)| index)
            .collect();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[BackTraceFrame] {
        &self.frames
    }

    pub fn top_frame(&self) -> Option<&BackTraceFrame> {
        self.frames.first()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_frames(&self) -> impl Iterator<Item = &BackTraceFrame> {
        self.visible.iter().map(|index| &self.frames[*index])
    }

    pub fn visible_frame(&self, visible_index: usize) -> Option<&BackTraceFrame> {
        self.frames.get(self.actual_index(visible_index)?)
    }

    /// Maps an index into the visible frames back to the unfiltered stack.
    pub fn actual_index(&self, visible_index: usize) -> Option<usize> {
        self.visible.get(visible_index).copied()
    }
}
