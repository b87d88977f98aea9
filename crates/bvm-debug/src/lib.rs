//! Client-side debugger engine for the bytecode virtual machine.
//!
//! [`Session`] drives one VM connection (built on `bvm-wire`): it spawns and
//! runs a process, manages breakpoints, implements the stepping algorithms,
//! and decodes backtraces, locals and uncaught exceptions against the
//! program's symbol table ([`program`]).

pub mod backtrace;
pub mod config;
pub mod error;
pub mod format;
pub mod program;
pub mod repl;
pub mod scope;
pub mod session;
pub mod state;
pub mod value;

pub use config::{DebugConfig, LoggingConfig, SessionConfig};
pub use error::{DebugError, DebugResult};
pub use session::Session;
