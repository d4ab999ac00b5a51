use crate::error::{VmError, VmResult};
use crate::memory::Memory;
use std::fmt::{Display, Error, Formatter};

/// Maximum number of local variables per routine
pub const MAX_LOCALS: usize = 15;

/// Where a routine's return value goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTarget {
    /// Write to this variable in the caller's scope
    Store(u8),
    /// call_*n forms, interrupt routines and v6 main
    Discard,
}

/// Header of a routine as it appears in high memory: a local count byte
/// followed, in versions 1-4 only, by the initial value of each local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineHeader {
    pub address: u32,
    pub num_locals: u8,
    pub initial_values: [u16; MAX_LOCALS],
    /// First instruction of the routine body
    pub code_start: u32,
}

impl RoutineHeader {
    pub fn read(memory: &Memory, address: u32, version: u8) -> VmResult<Self> {
        let num_locals = memory.read_byte(address)?;
        if num_locals as usize > MAX_LOCALS {
            return Err(VmError::InvalidRoutine {
                address,
                locals: num_locals,
            });
        }

        let mut initial_values = [0u16; MAX_LOCALS];
        let mut code_start = address + 1;
        if version <= 4 {
            for value in initial_values.iter_mut().take(num_locals as usize) {
                *value = memory.read_word(code_start)?;
                code_start += 2;
            }
        }

        Ok(RoutineHeader {
            address,
            num_locals,
            initial_values,
            code_start,
        })
    }
}

/// One activation record on the routine-context stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineContext {
    /// Unpacked address of the routine header
    pub routine_addr: u32,
    /// PC to resume at in the caller
    pub return_pc: u32,
    pub result: ResultTarget,
    pub num_locals: u8,
    pub locals: [u16; MAX_LOCALS],
    /// Arguments the caller supplied, capped to `num_locals`
    pub args_supplied: u8,
    /// Evaluation stack depth at the moment of the call
    pub stack_base: usize,
}

impl RoutineContext {
    pub fn new(
        header: &RoutineHeader,
        args: &[u16],
        return_pc: u32,
        result: ResultTarget,
        stack_base: usize,
    ) -> Self {
        let mut locals = header.initial_values;
        let supplied = args.len().min(header.num_locals as usize);
        locals[..supplied].copy_from_slice(&args[..supplied]);
        RoutineContext {
            routine_addr: header.address,
            return_pc,
            result,
            num_locals: header.num_locals,
            locals,
            args_supplied: supplied as u8,
            stack_base,
        }
    }

    /// Local `index` (0-based), checked against the declared count
    pub fn local(&self, index: u8) -> VmResult<u16> {
        if index >= self.num_locals {
            return Err(VmError::LocalOutOfRange {
                variable: index + 1,
                declared: self.num_locals,
            });
        }
        Ok(self.locals[index as usize])
    }

    pub fn set_local(&mut self, index: u8, value: u16) -> VmResult<()> {
        if index >= self.num_locals {
            return Err(VmError::LocalOutOfRange {
                variable: index + 1,
                declared: self.num_locals,
            });
        }
        self.locals[index as usize] = value;
        Ok(())
    }
}

impl Display for RoutineContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "routine {:05x} ({} locals, {} args) -> {:05x}",
            self.routine_addr, self.num_locals, self.args_supplied, self.return_pc
        )?;
        match self.result {
            ResultTarget::Store(var) => write!(f, " store V{:02x}", var),
            ResultTarget::Discard => write!(f, " discard"),
        }
    }
}
