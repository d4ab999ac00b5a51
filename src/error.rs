//! Error type shared by every layer of the engine.
//!
//! Anything returned as a `VmError` is fatal to the current run: the fetch
//! loop stops and the error is handed to the host. Faults that story files
//! are known to trigger on purpose (illegal object numbers, missing
//! properties) are not represented here; they are logged and skipped.

use crate::opcode_tables::OpcodeFamily;
use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("illegal instruction at {address:#07x}: {family} opcode {opcode:#04x} is not defined in version {version}")]
    IllegalInstruction {
        address: u32,
        family: OpcodeFamily,
        opcode: u8,
        version: u8,
    },

    #[error("stack underflow at PC {pc:#07x}")]
    StackUnderflow { pc: u32 },

    #[error("stack overflow: depth limit of {limit} values reached")]
    StackOverflow { limit: usize },

    #[error("no routine context active")]
    NoRoutineContext,

    #[error("local variable {variable} out of range: routine declares {declared} locals")]
    LocalOutOfRange { variable: u8, declared: u8 },

    #[error("throw to frame {frame}, but only {depth} routine contexts are active")]
    InvalidCatchFrame { frame: u16, depth: usize },

    #[error("memory access out of bounds at {address:#07x}")]
    MemoryOutOfBounds { address: u32 },

    #[error("write to static memory at {address:#07x} (dynamic memory ends at {limit:#06x})")]
    StaticMemoryWrite { address: u32, limit: u32 },

    #[error("routine at {address:#07x} declares {locals} locals (maximum is 15)")]
    InvalidRoutine { address: u32, locals: u8 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid story file: {0}")]
    InvalidStory(String),

    #[error("unsupported story version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid run state: {0}")]
    InvalidRunState(&'static str),

    #[error("malformed text: {0}")]
    Text(String),

    #[error("display error: {0}")]
    Display(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<crate::display_trait::DisplayError> for VmError {
    fn from(error: crate::display_trait::DisplayError) -> Self {
        VmError::Display(error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_instruction_message_names_family_and_version() {
        let err = VmError::IllegalInstruction {
            address: 0x1234,
            family: OpcodeFamily::Ext,
            opcode: 0x0f,
            version: 5,
        };
        let text = err.to_string();
        assert!(text.contains("EXT"));
        assert!(text.contains("0x0f"));
        assert!(text.contains("version 5"));
    }

    #[test]
    fn test_local_out_of_range_message() {
        let err = VmError::LocalOutOfRange {
            variable: 5,
            declared: 3,
        };
        assert_eq!(
            err.to_string(),
            "local variable 5 out of range: routine declares 3 locals"
        );
    }
}
