//! Wire protocol client for the bytecode virtual machine's debugging channel.
//!
//! The VM speaks a closed set of length-prefixed binary messages over a byte
//! stream. This crate provides:
//! - the command/message enums and their codec ([`Command`], [`Message`]),
//! - a [`MessageChannel`] that decodes incoming frames on a background task
//!   and diverts program stdout/stderr to caller-supplied sinks,
//! - [`VmConnection`], the strictly sequential command/response cursor the
//!   debugger builds on.

mod channel;
mod codec;
mod connection;
mod message;
mod types;

pub use channel::{ChannelConfig, MessageChannel, OutputSink, OutputSinks};
pub use codec::{WireReader, WireWriter};
pub use connection::VmConnection;
pub use message::{opcode, Command, Message};
pub use types::{
    BreakpointId, ClassId, FiberId, FunctionId, ProcessId, Result, WireError, WireValue,
    NO_BREAKPOINT,
};

/// Frame header: `u32` payload length followed by a one byte opcode.
pub const HEADER_LEN: usize = 5;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

// Scripted VM for this crate's unit tests and for downstream suites that
// enable `wire-test-support`.
#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;
