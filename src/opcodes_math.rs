/// Arithmetic, bitwise and comparison operations
///
/// All arithmetic is on 16-bit words with two's-complement wraparound.
/// Signed operations reinterpret the bit pattern; nothing traps on overflow.
/// Division and remainder by zero are fatal.
use crate::display_trait::ZMachineDisplay;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use log::debug;

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle mathematical and logical opcodes
    pub fn execute_math_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let a = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.info.op {
            // ---- BRANCHING COMPARISONS ----
            Op::Jz => self.branch_on(inst, a == 0),
            // je a b c d: a equals any of the rest
            Op::Je => {
                let hit = operands.len() > 1 && operands[1..].contains(&a);
                self.branch_on(inst, hit)
            }
            Op::Jl => self.branch_on(inst, (a as i16) < (b as i16)),
            Op::Jg => self.branch_on(inst, (a as i16) > (b as i16)),
            Op::Test => self.branch_on(inst, a & b == b),

            // ---- STORING ARITHMETIC ----
            _ => {
                let result = self.math_result(inst, a, b)?;
                debug!("{} {} {} -> {}", inst.name(), a, b, result);
                self.store_result(inst, result)?;
                Ok(ExecutionResult::Continue)
            }
        }
    }

    fn math_result(&self, inst: &Instruction, a: u16, b: u16) -> VmResult<u16> {
        let (sa, sb) = (a as i16, b as i16);
        Ok(match inst.info.op {
            Op::Or => a | b,
            Op::And => a & b,
            Op::Not => !a,
            Op::Add => sa.wrapping_add(sb) as u16,
            Op::Sub => sa.wrapping_sub(sb) as u16,
            Op::Mul => sa.wrapping_mul(sb) as u16,
            Op::Div => {
                if sb == 0 {
                    return Err(VmError::DivisionByZero);
                }
                // Truncates toward zero; -32768 / -1 wraps
                sa.wrapping_div(sb) as u16
            }
            Op::Mod => {
                if sb == 0 {
                    return Err(VmError::DivisionByZero);
                }
                // Sign follows the dividend
                sa.wrapping_rem(sb) as u16
            }
            Op::LogShift => shift(a, b as i16, false),
            Op::ArtShift => shift(a, b as i16, true),
            _ => return Err(self.illegal(inst)),
        })
    }
}

/// Shift left for positive `places`, right for negative. Shifts of 16 or
/// more places saturate: logical shifts give 0, arithmetic right shifts
/// fill with the sign bit.
pub(crate) fn shift(value: u16, places: i16, arithmetic: bool) -> u16 {
    if places >= 0 {
        if places >= 16 {
            0
        } else {
            value << places
        }
    } else {
        let places = places.unsigned_abs().min(16) as u32;
        if arithmetic {
            ((value as i16) >> places.min(15)) as u16
        } else if places >= 16 {
            0
        } else {
            value >> places
        }
    }
}
