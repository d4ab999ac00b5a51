use crate::config::EngineConfig;
use crate::display_trait::ZMachineDisplay;
use crate::error::{VmError, VmResult};
use crate::header::{self, Header};
use crate::instruction::{Instruction, Operand};
use crate::memory::Memory;
use crate::opcode_tables::{Op, OpcodeFamily};
use crate::opcodes_io::OutputStreams;
use crate::routine::ResultTarget;
use crate::save::{MemorySaveStore, SaveState, SaveStore, PRESERVED_FLAGS2};
use crate::text::TextCodec;
use crate::timed_input::RunState;
use crate::vm::VM;
use crate::zrand::ZRand;
use log::{debug, info, trace, warn};

/// Result of executing an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Continue execution normally
    Continue,
    /// Branch or jump taken, PC already updated
    Branched,
    /// Routine called, PC updated
    Called,
    /// Routine returned
    Returned(u16),
    /// Story asked to quit
    Quit,
    /// Waiting for the host to supply input
    Suspended,
}

/// The Z-Machine interpreter: the CPU plus the services instructions call
/// through (text codec, display, random numbers, save slots, streams).
pub struct Interpreter<D: ZMachineDisplay> {
    /// The VM state
    pub vm: VM,
    pub(crate) codec: TextCodec,
    pub(crate) display: D,
    pub(crate) rng: ZRand,
    pub(crate) run_state: RunState,
    pub(crate) streams: OutputStreams,
    pub(crate) config: EngineConfig,
    pub(crate) save_store: Box<dyn SaveStore>,
    /// Single-level undo for save_undo/restore_undo
    pub(crate) undo_slot: Option<SaveState>,
    /// Font selected with set_font
    pub(crate) font: u16,
    instruction_count: u64,
}

/// Operand `index`, or 0 when the instruction supplied fewer
pub(crate) fn arg(operands: &[u16], index: usize) -> u16 {
    operands.get(index).copied().unwrap_or(0)
}

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Load a story image and prepare it to run
    pub fn new(story: Vec<u8>, config: EngineConfig, display: D) -> VmResult<Self> {
        let mut memory = Memory::new(story);
        let header = Header::new(&memory)?;
        Header::write_interpreter_fields(&mut memory, header.version, &config)?;
        let vm = VM::new(memory, config.engine.max_stack_depth)?;
        let codec = TextCodec::new(&vm.memory, &vm.header)?;
        let rng = match config.engine.random_seed {
            Some(seed) => ZRand::new_predictable(seed),
            None => ZRand::new_uniform(),
        };
        info!(
            "Loaded story: version {}, release {}, serial {}",
            vm.header.version, vm.header.release, vm.header.serial
        );
        Ok(Interpreter {
            vm,
            codec,
            display,
            rng,
            run_state: RunState::Running,
            streams: OutputStreams::new(),
            config,
            save_store: Box::new(MemorySaveStore::new()),
            undo_slot: None,
            font: 1,
            instruction_count: 0,
        })
    }

    /// Replace the in-memory save slot with a host-provided store
    pub fn with_save_store(mut self, store: Box<dyn SaveStore>) -> Self {
        self.save_store = store;
        self
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run until the story quits or waits for input, or until the
    /// configured instruction limit is reached
    pub fn run(&mut self) -> VmResult<RunState> {
        self.run_with_limit(self.config.engine.instruction_limit)
    }

    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> VmResult<RunState> {
        debug!("run from PC {:05x} ({})", self.vm.pc, self.run_state);
        let mut executed = 0u64;
        while self.run_state.is_running() {
            if let Some(limit) = max_instructions {
                if executed >= limit {
                    info!("Reached instruction limit of {}", limit);
                    break;
                }
            }
            self.step()?;
            executed += 1;
        }
        if !self.run_state.is_running() {
            self.display.force_refresh()?;
        }
        Ok(self.run_state.clone())
    }

    /// Fetch, decode and execute one instruction. Any error stops the run.
    pub fn step(&mut self) -> VmResult<ExecutionResult> {
        if !self.run_state.is_running() {
            return Err(VmError::InvalidRunState("step called while not running"));
        }
        let result = self.fetch_and_execute();
        if result.is_err() {
            self.run_state = RunState::Stopped;
        }
        result
    }

    fn fetch_and_execute(&mut self) -> VmResult<ExecutionResult> {
        let pc = self.vm.pc;
        let instruction = self.vm.decode_at(pc)?;
        trace!("{:05x}: {}", pc, instruction);
        self.vm.pc = instruction.next_address();
        self.instruction_count += 1;
        self.execute_instruction(&instruction)
    }

    /// Execute a single decoded instruction; the PC must already point past it
    pub fn execute_instruction(&mut self, inst: &Instruction) -> VmResult<ExecutionResult> {
        let operands = self.resolve_operands(inst)?;
        match inst.opcode.family() {
            OpcodeFamily::Op0 => self.execute_0op(inst),
            OpcodeFamily::Op1 => self.execute_1op(inst, &operands),
            OpcodeFamily::Op2 => self.execute_2op(inst, &operands),
            OpcodeFamily::Var => self.execute_var(inst, &operands),
            OpcodeFamily::Ext => self.execute_ext(inst, &operands),
        }
    }

    /// Resolve operand values. Variable operands are read (and variable 0
    /// popped) in operand order.
    pub fn resolve_operands(&mut self, inst: &Instruction) -> VmResult<Vec<u16>> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for operand in &inst.operands {
            let value = match *operand {
                Operand::Variable(var) => self.vm.read_variable(var)?,
                other => other.raw(),
            };
            values.push(value);
        }
        Ok(values)
    }

    // ========================================================================
    // FAMILY DISPATCH
    // ========================================================================
    //
    // The decoder has already resolved (family, number, version) to an `Op`,
    // so each family only routes its operations to the module that
    // implements them.

    fn execute_0op(&mut self, inst: &Instruction) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::Rtrue | Op::Rfalse | Op::RetPopped | Op::Pop | Op::Catch => {
                self.execute_stack_op(inst, &[])
            }
            Op::Print | Op::PrintRet | Op::NewLine | Op::ShowStatus => {
                self.execute_display_op(inst, &[])
            }
            Op::Nop
            | Op::Save
            | Op::Restore
            | Op::Restart
            | Op::Quit
            | Op::Verify
            | Op::Piracy => self.execute_system_op(inst, &[]),
            _ => Err(self.illegal(inst)),
        }
    }

    fn execute_1op(&mut self, inst: &Instruction, operands: &[u16]) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::Jz | Op::Not => self.execute_math_op(inst, operands),
            Op::GetSibling | Op::GetChild | Op::GetParent | Op::GetPropLen | Op::RemoveObj => {
                self.execute_object_op(inst, operands)
            }
            Op::Inc | Op::Dec | Op::Load => self.execute_memory_op(inst, operands),
            Op::PrintAddr | Op::PrintObj | Op::PrintPaddr => self.execute_display_op(inst, operands),
            Op::Call1s | Op::Call1n | Op::Ret | Op::Jump => self.execute_stack_op(inst, operands),
            _ => Err(self.illegal(inst)),
        }
    }

    fn execute_2op(&mut self, inst: &Instruction, operands: &[u16]) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::Je
            | Op::Jl
            | Op::Jg
            | Op::Test
            | Op::Or
            | Op::And
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod => self.execute_math_op(inst, operands),
            Op::DecChk | Op::IncChk | Op::Store | Op::Loadw | Op::Loadb => {
                self.execute_memory_op(inst, operands)
            }
            Op::Jin
            | Op::TestAttr
            | Op::SetAttr
            | Op::ClearAttr
            | Op::InsertObj
            | Op::GetProp
            | Op::GetPropAddr
            | Op::GetNextProp => self.execute_object_op(inst, operands),
            Op::Call2s | Op::Call2n | Op::Throw => self.execute_stack_op(inst, operands),
            Op::SetColour => self.execute_display_op(inst, operands),
            _ => Err(self.illegal(inst)),
        }
    }

    fn execute_var(&mut self, inst: &Instruction, operands: &[u16]) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::CallVs
            | Op::CallVs2
            | Op::CallVn
            | Op::CallVn2
            | Op::Push
            | Op::Pull
            | Op::CheckArgCount => self.execute_stack_op(inst, operands),
            Op::Storew | Op::Storeb | Op::ScanTable | Op::CopyTable => {
                self.execute_memory_op(inst, operands)
            }
            Op::PutProp => self.execute_object_op(inst, operands),
            Op::Read
            | Op::ReadChar
            | Op::Tokenise
            | Op::EncodeText
            | Op::OutputStream
            | Op::InputStream => self.execute_io_op(inst, operands),
            Op::PrintChar
            | Op::PrintNum
            | Op::SplitWindow
            | Op::SetWindow
            | Op::EraseWindow
            | Op::EraseLine
            | Op::SetCursor
            | Op::GetCursor
            | Op::SetTextStyle
            | Op::BufferMode
            | Op::SoundEffect
            | Op::PrintTable => self.execute_display_op(inst, operands),
            Op::Random => self.execute_system_op(inst, operands),
            Op::Not => self.execute_math_op(inst, operands),
            _ => Err(self.illegal(inst)),
        }
    }

    fn execute_ext(&mut self, inst: &Instruction, operands: &[u16]) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::Save | Op::Restore | Op::SaveUndo | Op::RestoreUndo => {
                self.execute_system_op(inst, operands)
            }
            Op::LogShift | Op::ArtShift => self.execute_math_op(inst, operands),
            Op::PopStack | Op::PushStack => self.execute_stack_op(inst, operands),
            Op::SetFont
            | Op::PrintUnicode
            | Op::CheckUnicode
            | Op::SetTrueColour
            | Op::DrawPicture
            | Op::PictureData
            | Op::ErasePicture
            | Op::SetMargins
            | Op::MoveWindow
            | Op::WindowSize
            | Op::WindowStyle
            | Op::GetWindProp
            | Op::ScrollWindow
            | Op::ReadMouse
            | Op::MouseWindow
            | Op::PutWindProp
            | Op::PrintForm
            | Op::MakeMenu
            | Op::PictureTable
            | Op::BufferScreen => self.execute_display_op(inst, operands),
            _ => Err(self.illegal(inst)),
        }
    }

    pub(crate) fn illegal(&self, inst: &Instruction) -> VmError {
        VmError::IllegalInstruction {
            address: inst.address,
            family: inst.opcode.family(),
            opcode: inst.opcode.number(),
            version: self.vm.version(),
        }
    }

    // ========================================================================
    // RESULT HELPERS
    // ========================================================================

    /// Write `value` to the instruction's store variable, if it has one
    pub(crate) fn store_result(&mut self, inst: &Instruction, value: u16) -> VmResult<()> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Handle branching
    pub(crate) fn branch_on(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> VmResult<ExecutionResult> {
        let Some(branch) = inst.branch else {
            return Ok(ExecutionResult::Continue);
        };
        if condition != branch.on_true {
            return Ok(ExecutionResult::Continue);
        }
        self.vm.do_branch(inst.address, inst.length, branch.offset)?;
        Ok(match branch.offset {
            0 => ExecutionResult::Returned(0),
            1 => ExecutionResult::Returned(1),
            _ => ExecutionResult::Branched,
        })
    }

    /// Call with the result going to the instruction's store variable, or
    /// discarded for the `_n` call forms
    pub(crate) fn do_call(
        &mut self,
        inst: &Instruction,
        packed: u16,
        args: &[u16],
    ) -> VmResult<ExecutionResult> {
        let result = match inst.store_var {
            Some(var) => ResultTarget::Store(var),
            None => ResultTarget::Discard,
        };
        self.vm.call(packed, args, result)?;
        Ok(if packed == 0 {
            ExecutionResult::Continue
        } else {
            ExecutionResult::Called
        })
    }

    pub(crate) fn do_return(&mut self, value: u16) -> VmResult<ExecutionResult> {
        self.vm.return_with(value)?;
        Ok(ExecutionResult::Returned(value))
    }

    /// Run a routine to completion on the current stacks and return its
    /// result, leaving the PC where it was. Used for timed-input interrupts.
    pub(crate) fn call_nested_routine(&mut self, packed: u16) -> VmResult<u16> {
        debug!("Calling interrupt routine at {:04x}", packed);
        if packed == 0 {
            return Ok(0);
        }
        let saved_pc = self.vm.pc;
        let saved_state = std::mem::replace(&mut self.run_state, RunState::Running);
        let saved_depth = self.vm.call_depth();
        self.vm.call(packed, &[], ResultTarget::Store(0))?;

        let limit = self.config.engine.timer_instruction_limit;
        let mut executed = 0u64;
        while self.vm.call_depth() > saved_depth {
            if executed >= limit {
                return Err(VmError::InvalidRunState(
                    "interrupt routine exceeded its instruction limit",
                ));
            }
            match self.fetch_and_execute()? {
                ExecutionResult::Quit => return Ok(0),
                ExecutionResult::Suspended => {
                    return Err(VmError::InvalidRunState(
                        "interrupt routine tried to read input",
                    ))
                }
                _ => {}
            }
            executed += 1;
        }

        let value = self.vm.pop()?;
        debug!("Interrupt routine returned {}", value);
        self.vm.pc = saved_pc;
        self.run_state = saved_state;
        Ok(value)
    }

    // ========================================================================
    // SYSTEM OPERATIONS
    // ========================================================================

    fn execute_system_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        match inst.info.op {
            Op::Nop => Ok(ExecutionResult::Continue),
            Op::Quit => {
                info!("quit at {:05x}", inst.address);
                self.run_state = RunState::Stopped;
                Ok(ExecutionResult::Quit)
            }
            Op::Restart => {
                self.restart()?;
                Ok(ExecutionResult::Branched)
            }
            Op::Verify => {
                let sum = self.vm.checksum();
                debug!(
                    "verify: computed {:04x}, header {:04x}",
                    sum, self.vm.header.checksum_file
                );
                self.branch_on(inst, sum == self.vm.header.checksum_file)
            }
            // Interpreters are asked to be gullible
            Op::Piracy => self.branch_on(inst, true),
            Op::Random => {
                let value = self.rng.random(arg(operands, 0) as i16);
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Save => {
                if !operands.is_empty() {
                    warn!("save of a memory region is not supported");
                    return self.complete_save(inst, false);
                }
                let state = SaveState::from_vm(&self.vm, inst.address)?;
                let saved = self.save_store.save(&state);
                info!("save {}", if saved { "succeeded" } else { "failed" });
                self.complete_save(inst, saved)
            }
            Op::Restore => {
                if !operands.is_empty() {
                    warn!("restore of a memory region is not supported");
                    return self.complete_save(inst, false);
                }
                match self.save_store.restore() {
                    Some(state) if state.matches(&self.vm.header) => self.resume_from(&state),
                    Some(_) => {
                        warn!("restore: saved state belongs to a different story");
                        self.complete_save(inst, false)
                    }
                    None => self.complete_save(inst, false),
                }
            }
            Op::SaveUndo => {
                self.undo_slot = Some(SaveState::from_vm(&self.vm, inst.address)?);
                debug!("save_undo at {:05x}", inst.address);
                self.store_result(inst, 1)?;
                Ok(ExecutionResult::Continue)
            }
            Op::RestoreUndo => match self.undo_slot.take() {
                Some(state) => self.resume_from(&state),
                None => {
                    debug!("restore_undo with nothing saved");
                    self.store_result(inst, 0)?;
                    Ok(ExecutionResult::Continue)
                }
            },
            _ => Err(self.illegal(inst)),
        }
    }

    /// Finish a save-class instruction: v1-3 branch, later versions store
    fn complete_save(&mut self, inst: &Instruction, success: bool) -> VmResult<ExecutionResult> {
        if inst.branch.is_some() {
            self.branch_on(inst, success)
        } else {
            self.store_result(inst, success as u16)?;
            Ok(ExecutionResult::Continue)
        }
    }

    /// Reinstate a snapshot and complete the instruction that took it as
    /// "restored": branch taken in v1-3, 2 stored otherwise.
    fn resume_from(&mut self, state: &SaveState) -> VmResult<ExecutionResult> {
        state.restore_into(&mut self.vm)?;
        let version = self.vm.version();
        Header::write_interpreter_fields(&mut self.vm.memory, version, &self.config)?;
        self.vm.refresh_header()?;
        let save_inst = self.vm.decode_at(state.save_pc)?;
        self.vm.pc = save_inst.next_address();
        if save_inst.branch.is_some() {
            self.branch_on(&save_inst, true)
        } else {
            self.store_result(&save_inst, 2)?;
            Ok(ExecutionResult::Continue)
        }
    }

    /// Reload dynamic memory from the original image and start over. The
    /// transcript and fixed-pitch bits of flags2 are kept.
    pub fn restart(&mut self) -> VmResult<()> {
        info!("Restarting story");
        let kept = self.vm.memory.read_word(header::FLAGS2)? & PRESERVED_FLAGS2;
        self.vm
            .memory
            .reset_prefix(self.vm.header.base_static_mem as usize);
        let flags2 = self.vm.memory.read_word(header::FLAGS2)? & !PRESERVED_FLAGS2;
        self.vm.memory.write_word(header::FLAGS2, flags2 | kept)?;
        let version = self.vm.version();
        Header::write_interpreter_fields(&mut self.vm.memory, version, &self.config)?;
        self.vm.reset()?;
        self.streams.reset();
        self.run_state = RunState::Running;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_headless::HeadlessDisplay;
    use crate::test_utils::StoryBuilder;
    use test_log::test;

    pub(crate) fn create_test_interpreter(story: Vec<u8>) -> Interpreter<HeadlessDisplay> {
        let mut config = EngineConfig::default();
        config.engine.random_seed = Some(1);
        Interpreter::new(story, config, HeadlessDisplay::new()).unwrap()
    }

    #[test]
    fn test_simple_execution() {
        // add #3 #4 -> G10; quit
        let story = StoryBuilder::new(3)
            .main(&[0x14, 0x03, 0x04, 0x10, 0xBA])
            .build();
        let mut interp = create_test_interpreter(story);
        let state = interp.run().unwrap();
        assert_eq!(state, RunState::Stopped);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 7);
        assert_eq!(interp.instruction_count(), 2);
    }

    #[test]
    fn test_step_after_quit_is_rejected() {
        let story = StoryBuilder::new(5).main(&[0xBA]).build();
        let mut interp = create_test_interpreter(story);
        assert_eq!(interp.step().unwrap(), ExecutionResult::Quit);
        assert!(matches!(
            interp.step(),
            Err(VmError::InvalidRunState(_))
        ));
    }

    #[test]
    fn test_illegal_opcode_stops_the_run() {
        // 2OP:0x00 does not exist in any version
        let story = StoryBuilder::new(5).main(&[0x00, 0x01, 0x02]).build();
        let mut interp = create_test_interpreter(story);
        let err = interp.run().unwrap_err();
        assert!(matches!(err, VmError::IllegalInstruction { opcode: 0, .. }));
        assert_eq!(interp.run_state(), &RunState::Stopped);
    }

    #[test]
    fn test_instruction_limit() {
        // jump -1 lands back on itself
        let story = StoryBuilder::new(3).main(&[0x8C, 0xFF, 0xFF]).build();
        let mut interp = create_test_interpreter(story);
        let state = interp.run_with_limit(Some(50)).unwrap();
        assert_eq!(state, RunState::Running);
        assert_eq!(interp.instruction_count(), 50);
        assert_eq!(interp.vm.pc, StoryBuilder::INITIAL_PC);
    }

    #[test]
    fn test_verify_and_piracy() {
        // verify ?~skip; store G10 #1; skip: quit
        let story = StoryBuilder::new(5)
            .main(&[
                0xBD, 0x45, // verify, branch on false over the store
                0x0D, 0x10, 0x01, // store G10 #1
                0xBA,
            ])
            .build();
        let mut interp = create_test_interpreter(story);
        interp.run().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
    }

    #[test]
    fn test_random_is_stored() {
        // random #6 -> G10; quit
        let story = StoryBuilder::new(5)
            .main(&[0xE7, 0x7F, 0x06, 0x10, 0xBA])
            .build();
        let mut interp = create_test_interpreter(story);
        interp.run().unwrap();
        let value = interp.vm.read_global(0x10).unwrap();
        assert!((1..=6).contains(&value));
    }

    #[test]
    fn test_restart_reloads_dynamic_memory() {
        // store G10 #9; quit
        let story = StoryBuilder::new(3)
            .main(&[0x0D, 0x10, 0x09, 0xBA])
            .build();
        let mut interp = create_test_interpreter(story);
        interp.run().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 9);
        interp.restart().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.pc, StoryBuilder::INITIAL_PC);
        assert!(interp.run_state().is_running());
    }

    #[test]
    fn test_save_and_restore_v3() {
        let routine = 0x1000;
        let story = StoryBuilder::new(3)
            // call routine -> G11; quit
            .main(&[
                0xE0, 0x3F, (StoryBuilder::packed(3, routine) >> 8) as u8,
                StoryBuilder::packed(3, routine) as u8, 0x11,
                0xBA,
            ])
            .routine(
                routine,
                0,
                &[],
                &[
                    0xB5, 0xC1, // save ?rtrue
                    0xB6, 0xC1, // restore ?rtrue
                    0xB1, // rfalse
                ],
            )
            .build();
        let mut interp = create_test_interpreter(story);
        interp.run().unwrap();
        // save branches to rtrue before restore is ever reached
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 1);
    }
}
