//! zexec: an execution engine for Z-machine story files, versions 1 to 8.
//!
//! `Interpreter` owns the `VM` (memory, stacks, routine contexts) together
//! with the text codec, output streams and a host display. It runs until the
//! story quits or asks for input, then hands control back to the host.

pub mod config;
pub mod dictionary;
pub mod display_crossterm;
pub mod display_headless;
pub mod display_logging;
pub mod display_trait;
pub mod error;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod opcode_tables;
pub mod opcodes_display;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_stack;
pub mod routine;
pub mod save;
pub mod text;
pub mod timed_input;
pub mod vm;
pub mod zobject;
pub mod zrand;

/// Story image builders shared by unit and integration tests
#[doc(hidden)]
pub mod test_utils;

pub use config::EngineConfig;
pub use error::{VmError, VmResult};
pub use interpreter::{ExecutionResult, Interpreter};
pub use timed_input::{InputMode, InputRequest, RunState, TimedInterrupt};

