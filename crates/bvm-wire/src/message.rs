//! The closed set of commands the debugger sends and messages the virtual
//! machine answers with.

use crate::codec::{encode_frame, WireReader, WireWriter};
use crate::types::{
    BreakpointId, ClassId, FiberId, FunctionId, ProcessId, Result, WireError, WireValue,
};

pub mod opcode {
    pub const HANDSHAKE: u8 = 0x01;
    pub const ENABLE_DEBUGGING: u8 = 0x02;
    pub const ENABLE_LIVE_EDITING: u8 = 0x03;
    pub const DISABLE_STANDARD_OUTPUT: u8 = 0x04;
    pub const PUSH_FUNCTION: u8 = 0x05;

    pub const PROCESS_SPAWN_FOR_MAIN: u8 = 0x10;
    pub const PROCESS_RUN: u8 = 0x11;
    pub const PROCESS_STEP: u8 = 0x12;
    pub const PROCESS_STEP_OVER: u8 = 0x13;
    pub const PROCESS_STEP_OUT: u8 = 0x14;
    pub const PROCESS_STEP_TO: u8 = 0x15;
    pub const PROCESS_CONTINUE: u8 = 0x16;
    pub const PROCESS_RESTART_FRAME: u8 = 0x17;

    pub const PROCESS_SET_BREAKPOINT: u8 = 0x20;
    pub const PROCESS_DELETE_BREAKPOINT: u8 = 0x21;
    pub const PROCESS_DELETE_ONE_SHOT_BREAKPOINT: u8 = 0x22;

    pub const PROCESS_BACKTRACE_REQUEST: u8 = 0x30;
    pub const PROCESS_FIBER_BACKTRACE_REQUEST: u8 = 0x31;
    pub const PROCESS_FIBERS: u8 = 0x32;
    pub const PROCESS_GET_PROCESS_IDS: u8 = 0x33;
    pub const PROCESS_LOCAL: u8 = 0x34;
    pub const PROCESS_LOCAL_STRUCTURE: u8 = 0x35;
    pub const PROCESS_UNCAUGHT_EXCEPTION_REQUEST: u8 = 0x36;

    pub const WRITE_SNAPSHOT: u8 = 0x40;
    pub const SESSION_END: u8 = 0x41;

    pub const HANDSHAKE_RESULT: u8 = 0x80;
    pub const SET_BREAKPOINT_RESULT: u8 = 0x81;
    pub const DELETE_BREAKPOINT_RESULT: u8 = 0x82;
    pub const BACKTRACE: u8 = 0x83;
    pub const NUMBER_OF_STACKS: u8 = 0x84;
    pub const PROCESS_IDS_RESULT: u8 = 0x85;
    pub const VALUE: u8 = 0x86;
    pub const INSTANCE_STRUCTURE: u8 = 0x87;
    pub const WRITE_SNAPSHOT_RESULT: u8 = 0x88;

    pub const PROCESS_BREAKPOINT: u8 = 0x90;
    pub const UNCAUGHT_EXCEPTION: u8 = 0x91;
    pub const PROCESS_COMPILE_TIME_ERROR: u8 = 0x92;
    pub const PROCESS_TERMINATED: u8 = 0x93;

    pub const STDOUT_DATA: u8 = 0xA0;
    pub const STDERR_DATA: u8 = 0xA1;
}

/// Outgoing command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    HandShake { version: String },
    EnableDebugging,
    EnableLiveEditing,
    DisableStandardOutput,
    /// Pushes a function reference consumed by the next `ProcessSetBreakpoint`.
    PushFunction { function_id: FunctionId },

    ProcessSpawnForMain { arguments: Vec<String> },
    ProcessRun,
    ProcessStep,
    ProcessStepOver,
    ProcessStepOut,
    ProcessStepTo {
        function_id: FunctionId,
        bytecode_index: u32,
    },
    ProcessContinue,
    ProcessRestartFrame { frame: u32 },

    ProcessSetBreakpoint { bytecode_index: u32 },
    ProcessDeleteBreakpoint { breakpoint_id: BreakpointId },
    ProcessDeleteOneShotBreakpoint {
        process_id: ProcessId,
        breakpoint_id: BreakpointId,
    },

    ProcessBacktraceRequest { process_id: ProcessId },
    ProcessFiberBacktraceRequest { fiber: FiberId },
    ProcessFibers,
    ProcessGetProcessIds,
    ProcessLocal { frame: u32, slot: u32 },
    ProcessLocalStructure { frame: u32, slot: u32 },
    ProcessUncaughtExceptionRequest,

    WriteSnapshot { path: String },
    SessionEnd,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        use opcode::*;
        match self {
            Self::HandShake { .. } => HANDSHAKE,
            Self::EnableDebugging => ENABLE_DEBUGGING,
            Self::EnableLiveEditing => ENABLE_LIVE_EDITING,
            Self::DisableStandardOutput => DISABLE_STANDARD_OUTPUT,
            Self::PushFunction { .. } => PUSH_FUNCTION,
            Self::ProcessSpawnForMain { .. } => PROCESS_SPAWN_FOR_MAIN,
            Self::ProcessRun => PROCESS_RUN,
            Self::ProcessStep => PROCESS_STEP,
            Self::ProcessStepOver => PROCESS_STEP_OVER,
            Self::ProcessStepOut => PROCESS_STEP_OUT,
            Self::ProcessStepTo { .. } => PROCESS_STEP_TO,
            Self::ProcessContinue => PROCESS_CONTINUE,
            Self::ProcessRestartFrame { .. } => PROCESS_RESTART_FRAME,
            Self::ProcessSetBreakpoint { .. } => PROCESS_SET_BREAKPOINT,
            Self::ProcessDeleteBreakpoint { .. } => PROCESS_DELETE_BREAKPOINT,
            Self::ProcessDeleteOneShotBreakpoint { .. } => PROCESS_DELETE_ONE_SHOT_BREAKPOINT,
            Self::ProcessBacktraceRequest { .. } => PROCESS_BACKTRACE_REQUEST,
            Self::ProcessFiberBacktraceRequest { .. } => PROCESS_FIBER_BACKTRACE_REQUEST,
            Self::ProcessFibers => PROCESS_FIBERS,
            Self::ProcessGetProcessIds => PROCESS_GET_PROCESS_IDS,
            Self::ProcessLocal { .. } => PROCESS_LOCAL,
            Self::ProcessLocalStructure { .. } => PROCESS_LOCAL_STRUCTURE,
            Self::ProcessUncaughtExceptionRequest => PROCESS_UNCAUGHT_EXCEPTION_REQUEST,
            Self::WriteSnapshot { .. } => WRITE_SNAPSHOT,
            Self::SessionEnd => SESSION_END,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HandShake { .. } => "HandShake",
            Self::EnableDebugging => "EnableDebugging",
            Self::EnableLiveEditing => "EnableLiveEditing",
            Self::DisableStandardOutput => "DisableStandardOutput",
            Self::PushFunction { .. } => "PushFunction",
            Self::ProcessSpawnForMain { .. } => "ProcessSpawnForMain",
            Self::ProcessRun => "ProcessRun",
            Self::ProcessStep => "ProcessStep",
            Self::ProcessStepOver => "ProcessStepOver",
            Self::ProcessStepOut => "ProcessStepOut",
            Self::ProcessStepTo { .. } => "ProcessStepTo",
            Self::ProcessContinue => "ProcessContinue",
            Self::ProcessRestartFrame { .. } => "ProcessRestartFrame",
            Self::ProcessSetBreakpoint { .. } => "ProcessSetBreakpoint",
            Self::ProcessDeleteBreakpoint { .. } => "ProcessDeleteBreakpoint",
            Self::ProcessDeleteOneShotBreakpoint { .. } => "ProcessDeleteOneShotBreakpoint",
            Self::ProcessBacktraceRequest { .. } => "ProcessBacktraceRequest",
            Self::ProcessFiberBacktraceRequest { .. } => "ProcessFiberBacktraceRequest",
            Self::ProcessFibers => "ProcessFibers",
            Self::ProcessGetProcessIds => "ProcessGetProcessIds",
            Self::ProcessLocal { .. } => "ProcessLocal",
            Self::ProcessLocalStructure { .. } => "ProcessLocalStructure",
            Self::ProcessUncaughtExceptionRequest => "ProcessUncaughtExceptionRequest",
            Self::WriteSnapshot { .. } => "WriteSnapshot",
            Self::SessionEnd => "SessionEnd",
        }
    }

    /// Number of messages the VM sends back for this command.
    ///
    /// `None` marks the structure reads, whose length is only known once the
    /// first response arrives; those cannot go through `run_command`.
    pub fn expected_responses(&self) -> Option<usize> {
        match self {
            Self::EnableDebugging
            | Self::EnableLiveEditing
            | Self::DisableStandardOutput
            | Self::PushFunction { .. }
            | Self::ProcessSpawnForMain { .. }
            | Self::SessionEnd => Some(0),

            Self::HandShake { .. }
            | Self::ProcessRun
            | Self::ProcessStep
            | Self::ProcessStepTo { .. }
            | Self::ProcessContinue
            | Self::ProcessRestartFrame { .. }
            | Self::ProcessSetBreakpoint { .. }
            | Self::ProcessDeleteBreakpoint { .. }
            | Self::ProcessDeleteOneShotBreakpoint { .. }
            | Self::ProcessBacktraceRequest { .. }
            | Self::ProcessFiberBacktraceRequest { .. }
            | Self::ProcessFibers
            | Self::ProcessGetProcessIds
            | Self::ProcessLocal { .. }
            | Self::WriteSnapshot { .. } => Some(1),

            // One-shot breakpoint acknowledgement, then the stop event.
            Self::ProcessStepOver | Self::ProcessStepOut => Some(2),

            Self::ProcessLocalStructure { .. } | Self::ProcessUncaughtExceptionRequest => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        match self {
            Self::HandShake { version } => w.write_string(version),
            Self::PushFunction { function_id } => w.write_u32(*function_id),
            Self::ProcessSpawnForMain { arguments } => {
                w.write_u32(arguments.len() as u32);
                for arg in arguments {
                    w.write_string(arg);
                }
            }
            Self::ProcessStepTo {
                function_id,
                bytecode_index,
            } => {
                w.write_u32(*function_id);
                w.write_u32(*bytecode_index);
            }
            Self::ProcessRestartFrame { frame } => w.write_u32(*frame),
            Self::ProcessSetBreakpoint { bytecode_index } => w.write_u32(*bytecode_index),
            Self::ProcessDeleteBreakpoint { breakpoint_id } => w.write_i32(*breakpoint_id),
            Self::ProcessDeleteOneShotBreakpoint {
                process_id,
                breakpoint_id,
            } => {
                w.write_u32(*process_id);
                w.write_i32(*breakpoint_id);
            }
            Self::ProcessBacktraceRequest { process_id } => w.write_u32(*process_id),
            Self::ProcessFiberBacktraceRequest { fiber } => w.write_u32(*fiber),
            Self::ProcessLocal { frame, slot } | Self::ProcessLocalStructure { frame, slot } => {
                w.write_u32(*frame);
                w.write_u32(*slot);
            }
            Self::WriteSnapshot { path } => w.write_string(path),
            Self::EnableDebugging
            | Self::EnableLiveEditing
            | Self::DisableStandardOutput
            | Self::ProcessRun
            | Self::ProcessStep
            | Self::ProcessStepOver
            | Self::ProcessStepOut
            | Self::ProcessContinue
            | Self::ProcessFibers
            | Self::ProcessGetProcessIds
            | Self::ProcessUncaughtExceptionRequest
            | Self::SessionEnd => {}
        }
        encode_frame(self.opcode(), &w.into_vec())
    }

    /// Decodes a command payload. Only the peer side (and the mock VM) needs this.
    pub fn decode(op: u8, payload: &[u8]) -> Result<Self> {
        use opcode::*;
        let mut r = WireReader::new(payload);
        let command = match op {
            HANDSHAKE => Self::HandShake {
                version: r.read_string()?,
            },
            ENABLE_DEBUGGING => Self::EnableDebugging,
            ENABLE_LIVE_EDITING => Self::EnableLiveEditing,
            DISABLE_STANDARD_OUTPUT => Self::DisableStandardOutput,
            PUSH_FUNCTION => Self::PushFunction {
                function_id: r.read_u32()?,
            },
            PROCESS_SPAWN_FOR_MAIN => {
                let count = r.read_count(4)?;
                let mut arguments = Vec::with_capacity(count);
                for _ in 0..count {
                    arguments.push(r.read_string()?);
                }
                Self::ProcessSpawnForMain { arguments }
            }
            PROCESS_RUN => Self::ProcessRun,
            PROCESS_STEP => Self::ProcessStep,
            PROCESS_STEP_OVER => Self::ProcessStepOver,
            PROCESS_STEP_OUT => Self::ProcessStepOut,
            PROCESS_STEP_TO => Self::ProcessStepTo {
                function_id: r.read_u32()?,
                bytecode_index: r.read_u32()?,
            },
            PROCESS_CONTINUE => Self::ProcessContinue,
            PROCESS_RESTART_FRAME => Self::ProcessRestartFrame {
                frame: r.read_u32()?,
            },
            PROCESS_SET_BREAKPOINT => Self::ProcessSetBreakpoint {
                bytecode_index: r.read_u32()?,
            },
            PROCESS_DELETE_BREAKPOINT => Self::ProcessDeleteBreakpoint {
                breakpoint_id: r.read_i32()?,
            },
            PROCESS_DELETE_ONE_SHOT_BREAKPOINT => Self::ProcessDeleteOneShotBreakpoint {
                process_id: r.read_u32()?,
                breakpoint_id: r.read_i32()?,
            },
            PROCESS_BACKTRACE_REQUEST => Self::ProcessBacktraceRequest {
                process_id: r.read_u32()?,
            },
            PROCESS_FIBER_BACKTRACE_REQUEST => Self::ProcessFiberBacktraceRequest {
                fiber: r.read_u32()?,
            },
            PROCESS_FIBERS => Self::ProcessFibers,
            PROCESS_GET_PROCESS_IDS => Self::ProcessGetProcessIds,
            PROCESS_LOCAL => Self::ProcessLocal {
                frame: r.read_u32()?,
                slot: r.read_u32()?,
            },
            PROCESS_LOCAL_STRUCTURE => Self::ProcessLocalStructure {
                frame: r.read_u32()?,
                slot: r.read_u32()?,
            },
            PROCESS_UNCAUGHT_EXCEPTION_REQUEST => Self::ProcessUncaughtExceptionRequest,
            WRITE_SNAPSHOT => Self::WriteSnapshot {
                path: r.read_string()?,
            },
            SESSION_END => Self::SessionEnd,
            other => {
                return Err(WireError::Protocol(format!("unknown command opcode {other:#04x}")));
            }
        };
        r.finish()?;
        Ok(command)
    }
}

/// Incoming message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    HandShakeResult {
        success: bool,
        version: String,
    },
    SetBreakpointResult {
        breakpoint_id: BreakpointId,
    },
    DeleteBreakpointResult {
        breakpoint_id: BreakpointId,
    },
    /// Innermost frame first; `function_ids` and `bytecode_indices` are parallel.
    Backtrace {
        function_ids: Vec<FunctionId>,
        bytecode_indices: Vec<u32>,
    },
    NumberOfStacks {
        count: u32,
    },
    ProcessIds {
        ids: Vec<ProcessId>,
    },
    Value(WireValue),
    /// Header of a structure read; exactly `fields` `Value` messages follow.
    InstanceStructure {
        class_id: ClassId,
        fields: u32,
    },
    WriteSnapshotResult {
        success: bool,
    },

    ProcessBreakpoint {
        breakpoint_id: BreakpointId,
        process_id: ProcessId,
        function_id: FunctionId,
        bytecode_index: u32,
    },
    UncaughtException {
        process_id: ProcessId,
    },
    ProcessCompileTimeError,
    ProcessTerminated,

    StdoutData(Vec<u8>),
    StderrData(Vec<u8>),

    /// Synthesized locally when the channel is gone; never on the wire.
    ConnectionError,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HandShakeResult { .. } => "HandShakeResult",
            Self::SetBreakpointResult { .. } => "SetBreakpointResult",
            Self::DeleteBreakpointResult { .. } => "DeleteBreakpointResult",
            Self::Backtrace { .. } => "Backtrace",
            Self::NumberOfStacks { .. } => "NumberOfStacks",
            Self::ProcessIds { .. } => "ProcessIds",
            Self::Value(_) => "Value",
            Self::InstanceStructure { .. } => "InstanceStructure",
            Self::WriteSnapshotResult { .. } => "WriteSnapshotResult",
            Self::ProcessBreakpoint { .. } => "ProcessBreakpoint",
            Self::UncaughtException { .. } => "UncaughtException",
            Self::ProcessCompileTimeError => "ProcessCompileTimeError",
            Self::ProcessTerminated => "ProcessTerminated",
            Self::StdoutData(_) => "StdoutData",
            Self::StderrData(_) => "StderrData",
            Self::ConnectionError => "ConnectionError",
        }
    }

    pub fn opcode(&self) -> Option<u8> {
        use opcode::*;
        let op = match self {
            Self::HandShakeResult { .. } => HANDSHAKE_RESULT,
            Self::SetBreakpointResult { .. } => SET_BREAKPOINT_RESULT,
            Self::DeleteBreakpointResult { .. } => DELETE_BREAKPOINT_RESULT,
            Self::Backtrace { .. } => BACKTRACE,
            Self::NumberOfStacks { .. } => NUMBER_OF_STACKS,
            Self::ProcessIds { .. } => PROCESS_IDS_RESULT,
            Self::Value(_) => VALUE,
            Self::InstanceStructure { .. } => INSTANCE_STRUCTURE,
            Self::WriteSnapshotResult { .. } => WRITE_SNAPSHOT_RESULT,
            Self::ProcessBreakpoint { .. } => PROCESS_BREAKPOINT,
            Self::UncaughtException { .. } => UNCAUGHT_EXCEPTION,
            Self::ProcessCompileTimeError => PROCESS_COMPILE_TIME_ERROR,
            Self::ProcessTerminated => PROCESS_TERMINATED,
            Self::StdoutData(_) => STDOUT_DATA,
            Self::StderrData(_) => STDERR_DATA,
            Self::ConnectionError => return None,
        };
        Some(op)
    }

    /// Encodes a framed message. `ConnectionError` has no wire form.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let op = self.opcode()?;
        let mut w = WireWriter::new();
        match self {
            Self::HandShakeResult { success, version } => {
                w.write_bool(*success);
                w.write_string(version);
            }
            Self::SetBreakpointResult { breakpoint_id }
            | Self::DeleteBreakpointResult { breakpoint_id } => w.write_i32(*breakpoint_id),
            Self::Backtrace {
                function_ids,
                bytecode_indices,
            } => {
                w.write_u32(function_ids.len() as u32);
                for id in function_ids {
                    w.write_u32(*id);
                }
                for index in bytecode_indices {
                    w.write_u32(*index);
                }
            }
            Self::NumberOfStacks { count } => w.write_u32(*count),
            Self::ProcessIds { ids } => {
                w.write_u32(ids.len() as u32);
                for id in ids {
                    w.write_u32(*id);
                }
            }
            Self::Value(value) => w.write_value(value),
            Self::InstanceStructure { class_id, fields } => {
                w.write_u32(*class_id);
                w.write_u32(*fields);
            }
            Self::WriteSnapshotResult { success } => w.write_bool(*success),
            Self::ProcessBreakpoint {
                breakpoint_id,
                process_id,
                function_id,
                bytecode_index,
            } => {
                w.write_i32(*breakpoint_id);
                w.write_u32(*process_id);
                w.write_u32(*function_id);
                w.write_u32(*bytecode_index);
            }
            Self::UncaughtException { process_id } => w.write_u32(*process_id),
            Self::StdoutData(bytes) | Self::StderrData(bytes) => w.write_bytes(bytes),
            Self::ProcessCompileTimeError | Self::ProcessTerminated | Self::ConnectionError => {}
        }
        Some(encode_frame(op, &w.into_vec()))
    }

    pub fn decode(op: u8, payload: &[u8]) -> Result<Self> {
        use opcode::*;
        let mut r = WireReader::new(payload);
        let message = match op {
            HANDSHAKE_RESULT => Self::HandShakeResult {
                success: r.read_bool()?,
                version: r.read_string()?,
            },
            SET_BREAKPOINT_RESULT => Self::SetBreakpointResult {
                breakpoint_id: r.read_i32()?,
            },
            DELETE_BREAKPOINT_RESULT => Self::DeleteBreakpointResult {
                breakpoint_id: r.read_i32()?,
            },
            BACKTRACE => {
                // Two parallel u32 arrays follow the count.
                let count = r.read_count(8)?;
                let mut function_ids = Vec::with_capacity(count);
                for _ in 0..count {
                    function_ids.push(r.read_u32()?);
                }
                let mut bytecode_indices = Vec::with_capacity(count);
                for _ in 0..count {
                    bytecode_indices.push(r.read_u32()?);
                }
                Self::Backtrace {
                    function_ids,
                    bytecode_indices,
                }
            }
            NUMBER_OF_STACKS => Self::NumberOfStacks {
                count: r.read_u32()?,
            },
            PROCESS_IDS_RESULT => {
                let count = r.read_count(4)?;
                let mut ids = Vec::with_capacity(count);
                for _ in 0..count {
                    ids.push(r.read_u32()?);
                }
                Self::ProcessIds { ids }
            }
            VALUE => Self::Value(r.read_value()?),
            INSTANCE_STRUCTURE => Self::InstanceStructure {
                class_id: r.read_u32()?,
                fields: r.read_u32()?,
            },
            WRITE_SNAPSHOT_RESULT => Self::WriteSnapshotResult {
                success: r.read_bool()?,
            },
            PROCESS_BREAKPOINT => Self::ProcessBreakpoint {
                breakpoint_id: r.read_i32()?,
                process_id: r.read_u32()?,
                function_id: r.read_u32()?,
                bytecode_index: r.read_u32()?,
            },
            UNCAUGHT_EXCEPTION => Self::UncaughtException {
                process_id: r.read_u32()?,
            },
            PROCESS_COMPILE_TIME_ERROR => Self::ProcessCompileTimeError,
            PROCESS_TERMINATED => Self::ProcessTerminated,
            STDOUT_DATA => Self::StdoutData(r.read_bytes()?),
            STDERR_DATA => Self::StderrData(r.read_bytes()?),
            other => {
                return Err(WireError::Protocol(format!("unknown message opcode {other:#04x}")));
            }
        };
        r.finish()?;
        Ok(message)
    }
}
