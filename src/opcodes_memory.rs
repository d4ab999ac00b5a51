/// Variable and memory access operations
///
/// - Indirect variable operations (load, store, inc, dec, inc_chk, dec_chk):
///   the operand names a variable, and variable 0 means the stack top in
///   place rather than a push or pop
/// - Word and byte access (loadw, loadb, storew, storeb) with 16-bit
///   address arithmetic
/// - Table operations (copy_table, scan_table)
use crate::display_trait::ZMachineDisplay;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use log::debug;

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle memory access opcodes
    pub fn execute_memory_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let a = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.info.op {
            // ---- VARIABLES BY REFERENCE ----
            Op::Load => {
                let value = self.vm.read_indirect(a as u8)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Store => {
                self.vm.write_indirect(a as u8, b)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Inc | Op::Dec => {
                let delta: i16 = if inst.info.op == Op::Inc { 1 } else { -1 };
                self.adjust_variable(a as u8, delta)?;
                Ok(ExecutionResult::Continue)
            }
            Op::IncChk => {
                let value = self.adjust_variable(a as u8, 1)?;
                self.branch_on(inst, value > b as i16)
            }
            Op::DecChk => {
                let value = self.adjust_variable(a as u8, -1)?;
                self.branch_on(inst, value < b as i16)
            }

            // ---- ARRAYS ----
            Op::Loadw => {
                let addr = a.wrapping_add(b.wrapping_mul(2));
                let value = self.vm.read_word(addr as u32)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Loadb => {
                let addr = a.wrapping_add(b);
                let value = self.vm.read_byte(addr as u32)?;
                self.store_result(inst, value as u16)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Storew => {
                let addr = a.wrapping_add(b.wrapping_mul(2));
                self.vm.write_word(addr as u32, arg(operands, 2))?;
                Ok(ExecutionResult::Continue)
            }
            Op::Storeb => {
                let addr = a.wrapping_add(b);
                self.vm.write_byte(addr as u32, arg(operands, 2) as u8)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- TABLES ----
            Op::CopyTable => {
                self.copy_table(a, b, arg(operands, 2) as i16)?;
                Ok(ExecutionResult::Continue)
            }
            Op::ScanTable => {
                let form = if operands.len() > 3 { operands[3] } else { 0x82 };
                let found = self.scan_table(a, b as u32, arg(operands, 2), form)?;
                self.store_result(inst, found)?;
                self.branch_on(inst, found != 0)
            }
            _ => Err(self.illegal(inst)),
        }
    }

    /// Add `delta` to a variable named by reference, returning the new
    /// signed value
    fn adjust_variable(&mut self, var: u8, delta: i16) -> VmResult<i16> {
        let value = (self.vm.read_indirect(var)? as i16).wrapping_add(delta);
        self.vm.write_indirect(var, value as u16)?;
        Ok(value)
    }

    /// copy_table: `second == 0` zeroes `|size|` bytes of `first`. A
    /// positive size copies as if through a temporary buffer; a negative
    /// size forces a forward byte-by-byte copy even when the tables overlap.
    fn copy_table(&mut self, first: u16, second: u16, size: i16) -> VmResult<()> {
        let len = size.unsigned_abs() as u32;
        let (first, second) = (first as u32, second as u32);
        debug!("copy_table {:04x} -> {:04x} size {}", first, second, size);
        if second == 0 {
            for i in 0..len {
                self.vm.write_byte(first + i, 0)?;
            }
        } else if size < 0 {
            for i in 0..len {
                let byte = self.vm.read_byte(first + i)?;
                self.vm.write_byte(second + i, byte)?;
            }
        } else {
            self.vm.copy_bytes(first, second, len)?;
        }
        Ok(())
    }

    /// Address of the first field in `table` whose leading word (form bit 7)
    /// or byte equals `value`, or 0. The low 7 bits of `form` give the
    /// field length.
    fn scan_table(&self, value: u16, table: u32, len: u16, form: u16) -> VmResult<u16> {
        let words = form & 0x80 != 0;
        let field_len = (form & 0x7F) as u32;
        for i in 0..len as u32 {
            let addr = table + i * field_len;
            let entry = if words {
                self.vm.read_word(addr)?
            } else {
                self.vm.read_byte(addr)? as u16
            };
            if entry == value {
                return Ok(addr as u16);
            }
        }
        Ok(0)
    }
}
