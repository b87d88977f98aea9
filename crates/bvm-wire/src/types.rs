use std::io;

use thiserror::Error;

pub type ProcessId = u32;
pub type FunctionId = u32;
pub type ClassId = u32;
pub type FiberId = u32;

/// Breakpoint ids are assigned by the virtual machine. `-1` is used on the wire
/// to mean "no breakpoint was planted".
pub type BreakpointId = i32;

pub const NO_BREAKPOINT: BreakpointId = -1;

pub type Result<T, E = WireError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection to the virtual machine is closed")]
    ConnectionClosed,
    #[error("command {0} does not declare a response count")]
    UnknownResponseCount(&'static str),
    #[error("virtual machine sent unexpected data during shutdown ({0})")]
    UnexpectedDataDuringShutdown(&'static str),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A decoded primitive (or opaque reference) value streamed back by the VM.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Instance { class_id: ClassId },
    Class { class_id: ClassId },
}

impl WireValue {
    pub(crate) const TAG_NULL: u8 = 0;
    pub(crate) const TAG_BOOLEAN: u8 = 1;
    pub(crate) const TAG_INTEGER: u8 = 2;
    pub(crate) const TAG_DOUBLE: u8 = 3;
    pub(crate) const TAG_STRING: u8 = 4;
    pub(crate) const TAG_INSTANCE: u8 = 5;
    pub(crate) const TAG_CLASS: u8 = 6;

    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Self::Instance { class_id } | Self::Class { class_id } => Some(*class_id),
            _ => None,
        }
    }
}
