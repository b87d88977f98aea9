use thiserror::Error;

use bvm_wire::BreakpointId;

pub type DebugResult<T> = Result<T, DebugError>;

#[derive(Error, Debug)]
pub enum DebugError {
    #[error("wire: {0}")]
    Wire(#[from] bvm_wire::WireError),
    #[error("no process is running")]
    NotRunning,
    #[error("a process is already loaded")]
    AlreadyLoaded,
    #[error("no current process")]
    NoProcess,
    /// The VM answered a run/step command with something that is not a stop
    /// event. The session can no longer be trusted.
    #[error("unknown process stop reason: {0}")]
    UnknownStopReason(String),
    #[error("expected {expected} from the virtual machine, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("breakpoint id mismatch: requested {requested}, virtual machine echoed {echoed}")]
    BreakpointIdMismatch {
        requested: BreakpointId,
        echoed: BreakpointId,
    },
    #[error("invalid frame {0}")]
    InvalidFrame(usize),
    #[error("cannot restart the outermost frame")]
    CannotRestart,
    #[error("no local named `{0}` in the selected frame")]
    UnknownLocal(String),
    #[error("program symbols: {0}")]
    Program(String),
}
