/// Stack and routine call operations
///
/// This module handles all stack-related opcodes including:
/// - Stack manipulation (push, pull, pop, and the v6 user stacks)
/// - Routine calls and returns in every call form
/// - Non-local exits (catch/throw) and argument counting
///
/// Call results go to the instruction's store variable, or are discarded
/// for the `_n` forms, which carry no store byte.
use crate::display_trait::ZMachineDisplay;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use log::debug;

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle stack and call-related opcodes
    pub fn execute_stack_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let a = arg(operands, 0);
        match inst.info.op {
            // ---- RETURNS ----
            Op::Rtrue => self.do_return(1),
            Op::Rfalse => self.do_return(0),
            Op::Ret => self.do_return(a),
            Op::RetPopped => {
                let value = self.vm.pop()?;
                self.do_return(value)
            }
            Op::Jump => {
                self.vm.jump(a as i16);
                Ok(ExecutionResult::Branched)
            }

            // ---- CALLS ----
            Op::Call1s | Op::Call1n => self.do_call(inst, a, &[]),
            Op::Call2s
            | Op::Call2n
            | Op::CallVs
            | Op::CallVs2
            | Op::CallVn
            | Op::CallVn2 => {
                let args = operands.get(1..).unwrap_or(&[]);
                self.do_call(inst, a, args)
            }
            Op::CheckArgCount => {
                let supplied = self.vm.current_context()?.args_supplied;
                self.branch_on(inst, a <= supplied as u16)
            }

            // ---- CATCH / THROW ----
            Op::Catch => {
                let frame = self.vm.catch_frame();
                debug!("catch -> frame {}", frame);
                self.store_result(inst, frame)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Throw => {
                let frame = arg(operands, 1);
                self.vm.throw(a, frame)?;
                Ok(ExecutionResult::Returned(a))
            }

            // ---- EVALUATION STACK ----
            Op::Push => {
                self.vm.push(a)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Pop => {
                self.vm.pop()?;
                Ok(ExecutionResult::Continue)
            }
            Op::Pull if self.vm.version() == 6 => {
                let value = match operands.first() {
                    Some(&stack) => self.pull_user_stack(stack as u32)?,
                    None => self.vm.pop()?,
                };
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Pull => {
                // The operand names the destination; pulling into the stack
                // replaces the new top in place
                let value = self.vm.pop()?;
                self.vm.write_indirect(a as u8, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::PopStack => {
                match operands.get(1) {
                    Some(&stack) => {
                        let free = self.vm.read_word(stack as u32)?;
                        self.vm.write_word(stack as u32, free.wrapping_add(a))?;
                    }
                    None => {
                        for _ in 0..a {
                            self.vm.pop()?;
                        }
                    }
                }
                Ok(ExecutionResult::Continue)
            }
            Op::PushStack => {
                let stack = arg(operands, 1) as u32;
                let free = self.vm.read_word(stack)?;
                if free == 0 {
                    return self.branch_on(inst, false);
                }
                self.vm.write_word(stack + 2 * free as u32, a)?;
                self.vm.write_word(stack, free - 1)?;
                self.branch_on(inst, true)
            }
            _ => Err(self.illegal(inst)),
        }
    }

    /// User stacks start with a count of free slots; the live values sit
    /// above the free ones
    fn pull_user_stack(&mut self, stack: u32) -> VmResult<u16> {
        let free = self.vm.read_word(stack)?.wrapping_add(1);
        self.vm.write_word(stack, free)?;
        self.vm.read_word(stack + 2 * free as u32)
    }
}
