use crate::error::{VmError, VmResult};
use crate::header::{self, Header};
use crate::instruction::Instruction;
use crate::memory::Memory;
use crate::routine::{ResultTarget, RoutineContext, RoutineHeader};
use log::{debug, info, trace};
use std::fmt;

/// Default bound on the evaluation stack
pub const DEFAULT_STACK_LIMIT: usize = 32768;

/// The Z-Machine CPU: program counter, the shared evaluation stack and the
/// routine-context stack, plus the memory they operate on.
///
/// The evaluation stack is shared by every active routine. Each context
/// records the depth at which it was entered; a routine may never pop below
/// that mark, and returning truncates the stack back to it.
pub struct VM {
    pub memory: Memory,
    pub header: Header,
    /// Program counter - current instruction address
    pub pc: u32,
    stack: Vec<u16>,
    call_stack: Vec<RoutineContext>,
    max_stack_depth: usize,
}

impl VM {
    pub fn new(memory: Memory, max_stack_depth: usize) -> VmResult<Self> {
        let header = Header::new(&memory)?;
        let mut vm = VM {
            memory,
            header,
            pc: 0,
            stack: Vec::new(),
            call_stack: Vec::new(),
            max_stack_depth,
        };
        vm.reset()?;
        Ok(vm)
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Reset the CPU to the story's entry point with empty stacks. Version 6
    /// starts by calling the main routine; earlier versions begin executing
    /// at the initial PC with no routine context.
    pub fn reset(&mut self) -> VmResult<()> {
        self.header = Header::new(&self.memory)?;
        self.stack.clear();
        self.call_stack.clear();
        if self.header.version == 6 {
            self.pc = 0;
            let main = self.unpack_routine_address(self.header.initial_pc);
            self.enter_routine(main, &[], ResultTarget::Discard)?;
        } else {
            self.pc = self.header.initial_pc as u32;
        }
        info!(
            "CPU reset: version {} starting at {:05x}",
            self.header.version, self.pc
        );
        Ok(())
    }

    /// Re-read the header after dynamic memory was replaced wholesale
    pub fn refresh_header(&mut self) -> VmResult<()> {
        self.header = Header::new(&self.memory)?;
        Ok(())
    }

    pub fn decode_at(&self, addr: u32) -> VmResult<Instruction> {
        Instruction::decode(&self.memory, addr, self.header.version)
    }

    // ---- evaluation stack ----

    /// Depth below which the current routine may not pop
    fn stack_floor(&self) -> usize {
        self.call_stack.last().map_or(0, |frame| frame.stack_base)
    }

    /// Push a value onto the evaluation stack
    pub fn push(&mut self, value: u16) -> VmResult<()> {
        if self.stack.len() >= self.max_stack_depth {
            return Err(VmError::StackOverflow {
                limit: self.max_stack_depth,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value from the evaluation stack
    pub fn pop(&mut self) -> VmResult<u16> {
        if self.stack.len() <= self.stack_floor() {
            return Err(VmError::StackUnderflow { pc: self.pc });
        }
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { pc: self.pc })
    }

    /// Peek at the top of the stack without removing it
    pub fn stack_top(&self) -> VmResult<u16> {
        if self.stack.len() <= self.stack_floor() {
            return Err(VmError::StackUnderflow { pc: self.pc });
        }
        self.stack
            .last()
            .copied()
            .ok_or(VmError::StackUnderflow { pc: self.pc })
    }

    /// Replace the top of the stack in place
    pub fn set_stack_top(&mut self, value: u16) -> VmResult<()> {
        let floor = self.stack_floor();
        let pc = self.pc;
        let len = self.stack.len();
        match self.stack.last_mut() {
            Some(top) if len > floor => {
                *top = value;
                Ok(())
            }
            _ => Err(VmError::StackUnderflow { pc }),
        }
    }

    /// Element `index` counted from the bottom of the whole stack
    pub fn stack_element(&self, index: usize) -> VmResult<u16> {
        self.stack
            .get(index)
            .copied()
            .ok_or(VmError::StackUnderflow { pc: self.pc })
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    // ---- routine contexts ----

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn contexts(&self) -> &[RoutineContext] {
        &self.call_stack
    }

    pub fn current_context(&self) -> VmResult<&RoutineContext> {
        self.call_stack.last().ok_or(VmError::NoRoutineContext)
    }

    /// Replace both stacks, as when a saved state is restored
    pub fn replace_stacks(&mut self, stack: Vec<u16>, contexts: Vec<RoutineContext>) {
        self.stack = stack;
        self.call_stack = contexts;
    }

    // ---- variables ----

    /// Read a variable (0x00 = stack, 0x01-0x0F = local, 0x10-0xFF = global).
    /// Reading variable 0 pops.
    pub fn read_variable(&mut self, var: u8) -> VmResult<u16> {
        let value = match var {
            0x00 => self.pop()?,
            0x01..=0x0F => self.current_context()?.local(var - 1)?,
            _ => self.read_global(var)?,
        };
        trace!("read V{:02x} = {:04x}", var, value);
        Ok(value)
    }

    /// Write a variable. Writing variable 0 pushes.
    pub fn write_variable(&mut self, var: u8, value: u16) -> VmResult<()> {
        trace!("write V{:02x} <- {:04x}", var, value);
        match var {
            0x00 => self.push(value),
            0x01..=0x0F => self
                .call_stack
                .last_mut()
                .ok_or(VmError::NoRoutineContext)?
                .set_local(var - 1, value),
            _ => self.write_global(var, value),
        }
    }

    /// Read a variable named by reference (inc, dec, load, ...): variable 0
    /// is the stack top, read in place.
    pub fn read_indirect(&mut self, var: u8) -> VmResult<u16> {
        if var == 0 {
            self.stack_top()
        } else {
            self.read_variable(var)
        }
    }

    /// Write a variable named by reference: variable 0 replaces the stack top.
    pub fn write_indirect(&mut self, var: u8, value: u16) -> VmResult<()> {
        if var == 0 {
            self.set_stack_top(value)
        } else {
            self.write_variable(var, value)
        }
    }

    fn global_addr(&self, var: u8) -> u32 {
        self.header.global_variables as u32 + 2 * (var as u32 - 0x10)
    }

    pub fn read_global(&self, var: u8) -> VmResult<u16> {
        debug_assert!(var >= 0x10);
        self.memory.read_word(self.global_addr(var))
    }

    pub fn write_global(&mut self, var: u8, value: u16) -> VmResult<()> {
        debug_assert!(var >= 0x10);
        let addr = self.global_addr(var);
        self.write_word(addr, value)
    }

    // ---- memory as seen by Z-code ----

    pub fn read_byte(&self, addr: u32) -> VmResult<u8> {
        self.memory.read_byte(addr)
    }

    pub fn read_word(&self, addr: u32) -> VmResult<u16> {
        self.memory.read_word(addr)
    }

    fn check_dynamic(&self, addr: u32, len: u32) -> VmResult<()> {
        let limit = self.header.base_static_mem as u32;
        if addr + len > limit {
            return Err(VmError::StaticMemoryWrite {
                address: addr,
                limit,
            });
        }
        Ok(())
    }

    /// Write a byte on behalf of the story; static memory is off limits
    pub fn write_byte(&mut self, addr: u32, value: u8) -> VmResult<()> {
        self.check_dynamic(addr, 1)?;
        self.memory.write_byte(addr, value)
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> VmResult<()> {
        self.check_dynamic(addr, 2)?;
        self.memory.write_word(addr, value)
    }

    /// Block copy for copy_table; overlapping ranges behave like memmove
    pub fn copy_bytes(&mut self, src: u32, dst: u32, len: u32) -> VmResult<()> {
        if len == 0 {
            return Ok(());
        }
        self.check_dynamic(dst, len)?;
        self.memory.copy_within(src, dst, len as usize)
    }

    // ---- addresses ----

    pub fn unpack_routine_address(&self, packed: u16) -> u32 {
        self.unpack(packed, self.header.routines_offset)
    }

    pub fn unpack_string_address(&self, packed: u16) -> u32 {
        self.unpack(packed, self.header.strings_offset)
    }

    fn unpack(&self, packed: u16, offset: u16) -> u32 {
        let packed = packed as u32;
        match self.header.version {
            1..=3 => packed * 2,
            4 | 5 => packed * 4,
            6 | 7 => packed * 4 + 8 * offset as u32,
            _ => packed * 8,
        }
    }

    // ---- call / return ----

    /// Call the routine at a packed address with the PC already pointing at
    /// the instruction after the call. Calling address 0 stores 0 and does
    /// nothing else.
    pub fn call(&mut self, packed: u16, args: &[u16], result: ResultTarget) -> VmResult<()> {
        if packed == 0 {
            debug!("call to address 0 at {:05x} returns 0", self.pc);
            if let ResultTarget::Store(var) = result {
                self.write_variable(var, 0)?;
            }
            return Ok(());
        }
        let addr = self.unpack_routine_address(packed);
        self.enter_routine(addr, args, result)
    }

    /// Push a context for the routine at an unpacked address and jump to its body
    pub fn enter_routine(&mut self, addr: u32, args: &[u16], result: ResultTarget) -> VmResult<()> {
        let routine = RoutineHeader::read(&self.memory, addr, self.header.version)?;
        let context = RoutineContext::new(&routine, args, self.pc, result, self.stack.len());
        debug!(
            "call {:05x} with {:?} (depth {})",
            addr,
            args,
            self.call_stack.len() + 1
        );
        self.call_stack.push(context);
        self.pc = routine.code_start;
        Ok(())
    }

    /// Return from the current routine with `value`
    pub fn return_with(&mut self, value: u16) -> VmResult<()> {
        let context = self.call_stack.pop().ok_or(VmError::NoRoutineContext)?;
        self.stack.truncate(context.stack_base);
        self.pc = context.return_pc;
        debug!(
            "return {:04x} from {:05x} to {:05x}",
            value, context.routine_addr, context.return_pc
        );
        if let ResultTarget::Store(var) = context.result {
            self.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Take a branch: offsets 0 and 1 return false/true from the current
    /// routine, anything else jumps relative to the end of the instruction.
    pub fn do_branch(&mut self, instruction_addr: u32, length: u32, offset: i16) -> VmResult<()> {
        match offset {
            0 => self.return_with(0),
            1 => self.return_with(1),
            _ => {
                let target = (instruction_addr as i64 + length as i64 + offset as i64 - 2) as u32;
                debug!("branch from {:05x} to {:05x}", instruction_addr, target);
                self.pc = target;
                Ok(())
            }
        }
    }

    /// Unconditional jump relative to the current PC (already past the jump)
    pub fn jump(&mut self, offset: i16) {
        self.pc = (self.pc as i64 + offset as i64 - 2) as u32;
    }

    /// Frame identifier for `catch`: the current routine-context depth
    pub fn catch_frame(&self) -> u16 {
        self.call_stack.len() as u16
    }

    /// Unwind to the routine that executed `catch` and return from it
    pub fn throw(&mut self, value: u16, frame: u16) -> VmResult<()> {
        let depth = self.call_stack.len();
        if frame == 0 || frame as usize > depth {
            return Err(VmError::InvalidCatchFrame { frame, depth });
        }
        debug!("throw {:04x} to frame {} (depth {})", value, frame, depth);
        self.call_stack.truncate(frame as usize);
        self.return_with(value)
    }

    /// Checksum of the original story from 0x40 to the declared file length
    pub fn checksum(&self) -> u16 {
        let original = self.memory.original();
        let end = self.header.len_file.min(original.len());
        original
            .get(header::HEADER_SIZE..end)
            .unwrap_or(&[])
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
    }
}

impl fmt::Display for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VM State:")?;
        writeln!(f, " PC: {:05x}", self.pc)?;
        writeln!(f, " Stack depth: {}", self.stack.len())?;
        writeln!(f, " Call depth: {}", self.call_stack.len())?;
        if let Some(top) = self.stack.last() {
            writeln!(f, " Stack top: {:04x}", top)?;
        }
        for (i, context) in self.call_stack.iter().enumerate() {
            writeln!(f, " Frame[{}]: {}", i, context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StoryBuilder;
    use test_log::test;

    const ROUTINE: u32 = 0x1000;

    fn create_test_vm(version: u8) -> VM {
        let story = StoryBuilder::new(version)
            .routine(ROUTINE, 3, &[0x11, 0x22, 0x33], &[0xB0])
            .routine(ROUTINE + 0x20, 2, &[], &[0xB1])
            .build();
        VM::new(Memory::new(story), DEFAULT_STACK_LIMIT).unwrap()
    }

    fn packed(vm: &VM, addr: u32) -> u16 {
        match vm.version() {
            1..=3 => (addr / 2) as u16,
            4..=7 => (addr / 4) as u16,
            _ => (addr / 8) as u16,
        }
    }

    #[test]
    fn test_vm_creation() {
        let vm = create_test_vm(3);
        assert_eq!(vm.pc, StoryBuilder::INITIAL_PC);
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn test_stack_variable_pushes_and_pops() {
        let mut vm = create_test_vm(3);
        for value in [1, 2, 3] {
            vm.write_variable(0, value).unwrap();
        }
        assert_eq!(vm.stack_element(1).unwrap(), 2);
        assert_eq!(vm.stack_depth(), 3);
        assert_eq!(vm.stack_top().unwrap(), 3);
        assert_eq!(vm.read_variable(0).unwrap(), 3);
        assert_eq!(vm.stack_depth(), 2);
    }

    #[test]
    fn test_stack_underflow() {
        let mut vm = create_test_vm(3);
        assert!(matches!(vm.pop(), Err(VmError::StackUnderflow { .. })));
        assert!(matches!(vm.read_variable(0), Err(VmError::StackUnderflow { .. })));
        assert!(vm.stack_top().is_err());
        assert!(vm.set_stack_top(1).is_err());
    }

    #[test]
    fn test_stack_overflow_is_bounded() {
        let story = StoryBuilder::new(3).build();
        let mut vm = VM::new(Memory::new(story), 2).unwrap();
        vm.push(1).unwrap();
        vm.push(2).unwrap();
        assert_eq!(vm.push(3), Err(VmError::StackOverflow { limit: 2 }));
    }

    #[test]
    fn test_indirect_stack_access_is_in_place() {
        let mut vm = create_test_vm(3);
        vm.push(10).unwrap();
        vm.push(20).unwrap();
        assert_eq!(vm.read_indirect(0).unwrap(), 20);
        vm.write_indirect(0, 21).unwrap();
        assert_eq!(vm.stack_depth(), 2);
        assert_eq!(vm.stack(), &[10, 21]);
    }

    #[test]
    fn test_globals_live_in_memory() {
        let mut vm = create_test_vm(3);
        vm.write_variable(0x10, 0xABCD).unwrap();
        vm.write_variable(0xFF, 0x1234).unwrap();
        let base = vm.header.global_variables as u32;
        assert_eq!(vm.read_word(base).unwrap(), 0xABCD);
        assert_eq!(vm.read_word(base + 2 * 239).unwrap(), 0x1234);
        assert_eq!(vm.read_variable(0x10).unwrap(), 0xABCD);
    }

    #[test]
    fn test_locals_need_a_routine_context() {
        let mut vm = create_test_vm(3);
        assert_eq!(vm.read_variable(1), Err(VmError::NoRoutineContext));
        assert_eq!(vm.write_variable(1, 5), Err(VmError::NoRoutineContext));
    }

    #[test]
    fn test_local_out_of_range() {
        let mut vm = create_test_vm(3);
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[], ResultTarget::Discard).unwrap();
        assert_eq!(
            vm.read_variable(5),
            Err(VmError::LocalOutOfRange {
                variable: 5,
                declared: 3
            })
        );
        assert!(vm.write_variable(4, 1).is_err());
    }

    #[test]
    fn test_call_sets_up_locals_and_pc() {
        let mut vm = create_test_vm(3);
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[7], ResultTarget::Store(0x10)).unwrap();
        assert_eq!(vm.call_depth(), 1);
        // v3 header: count byte plus three initial values
        assert_eq!(vm.pc, ROUTINE + 7);
        assert_eq!(vm.read_variable(1).unwrap(), 7);
        assert_eq!(vm.read_variable(2).unwrap(), 0x22);
        assert_eq!(vm.read_variable(3).unwrap(), 0x33);
        assert_eq!(vm.current_context().unwrap().args_supplied, 1);
    }

    #[test]
    fn test_v5_locals_start_at_zero() {
        let mut vm = create_test_vm(5);
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[9], ResultTarget::Discard).unwrap();
        assert_eq!(vm.pc, ROUTINE + 1);
        assert_eq!(vm.read_variable(1).unwrap(), 9);
        assert_eq!(vm.read_variable(2).unwrap(), 0);
    }

    #[test]
    fn test_call_then_return_restores_stack_depth() {
        let mut vm = create_test_vm(3);
        vm.push(0xAAAA).unwrap();
        let return_pc = vm.pc;
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[1, 2], ResultTarget::Store(0x10)).unwrap();
        vm.push(1).unwrap();
        vm.push(2).unwrap();
        vm.return_with(0x4242).unwrap();
        assert_eq!(vm.stack_depth(), 1);
        assert_eq!(vm.pc, return_pc);
        assert_eq!(vm.read_global(0x10).unwrap(), 0x4242);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn test_return_to_stack_variable_pushes_in_caller() {
        let mut vm = create_test_vm(3);
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[], ResultTarget::Store(0)).unwrap();
        vm.push(99).unwrap();
        vm.return_with(5).unwrap();
        assert_eq!(vm.stack(), &[5]);
    }

    #[test]
    fn test_discarded_result_changes_nothing() {
        let mut vm = create_test_vm(3);
        vm.write_global(0x10, 3).unwrap();
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[], ResultTarget::Discard).unwrap();
        vm.return_with(77).unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 3);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn test_call_to_address_zero() {
        let mut vm = create_test_vm(3);
        vm.write_global(0x10, 0xFFFF).unwrap();
        let pc = vm.pc;
        vm.call(0, &[1, 2, 3], ResultTarget::Store(0x10)).unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 0);
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.pc, pc);
    }

    #[test]
    fn test_return_without_context_fails() {
        let mut vm = create_test_vm(3);
        assert_eq!(vm.return_with(1), Err(VmError::NoRoutineContext));
    }

    #[test]
    fn test_routine_cannot_pop_callers_values() {
        let mut vm = create_test_vm(3);
        vm.push(1).unwrap();
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[], ResultTarget::Discard).unwrap();
        assert!(matches!(vm.pop(), Err(VmError::StackUnderflow { .. })));
        // ...but the whole stack stays visible for diagnostics
        assert_eq!(vm.stack_element(0).unwrap(), 1);
    }

    #[test]
    fn test_locals_are_scoped_to_their_context() {
        let mut vm = create_test_vm(3);
        let outer = packed(&vm, ROUTINE);
        let inner = packed(&vm, ROUTINE + 0x20);
        vm.call(outer, &[100], ResultTarget::Discard).unwrap();
        vm.call(inner, &[200], ResultTarget::Store(2)).unwrap();
        assert_eq!(vm.read_variable(1).unwrap(), 200);
        vm.write_variable(1, 201).unwrap();
        vm.return_with(55).unwrap();
        assert_eq!(vm.read_variable(1).unwrap(), 100);
        assert_eq!(vm.read_variable(2).unwrap(), 55);
    }

    #[test]
    fn test_branch_sentinels_return() {
        let mut vm = create_test_vm(3);
        let routine = packed(&vm, ROUTINE);
        vm.call(routine, &[], ResultTarget::Store(0x10)).unwrap();
        vm.do_branch(0x1234, 3, 1).unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 1);

        vm.call(routine, &[], ResultTarget::Store(0x10)).unwrap();
        vm.do_branch(0x1234, 3, 0).unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 0);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn test_branch_offsets_jump() {
        let mut vm = create_test_vm(3);
        vm.do_branch(0x2000, 4, 10).unwrap();
        assert_eq!(vm.pc, 0x2000 + 4 + 10 - 2);
        vm.do_branch(0x2000, 3, -20).unwrap();
        assert_eq!(vm.pc, 0x2000 + 3 - 20 - 2);
        vm.pc = 0x3000;
        vm.jump(-2);
        assert_eq!(vm.pc, 0x3000 - 4);
    }

    #[test]
    fn test_unpack_addresses() {
        for (version, multiplier) in [(1, 2), (3, 2), (4, 4), (5, 4), (8, 8)] {
            let vm = create_test_vm(version);
            for p in [1u16, 0x1234, 0xFFFF] {
                assert_eq!(vm.unpack_routine_address(p), p as u32 * multiplier);
                assert_eq!(vm.unpack_string_address(p), p as u32 * multiplier);
            }
        }
    }

    #[test]
    fn test_unpack_v7_uses_header_offsets() {
        let story = StoryBuilder::new(7)
            .header_word(header::ROUTINES_OFFSET, 0x10)
            .header_word(header::STRINGS_OFFSET, 0x20)
            .build();
        let vm = VM::new(Memory::new(story), DEFAULT_STACK_LIMIT).unwrap();
        assert_eq!(vm.unpack_routine_address(0x100), 0x400 + 0x80);
        assert_eq!(vm.unpack_string_address(0x100), 0x400 + 0x100);
    }

    #[test]
    fn test_v6_reset_calls_main_routine() {
        let story = StoryBuilder::new(6)
            .routine(ROUTINE, 1, &[], &[0xBA])
            .header_word(header::INITIAL_PC, (ROUTINE / 4) as u16)
            .build();
        let vm = VM::new(Memory::new(story), DEFAULT_STACK_LIMIT).unwrap();
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.pc, ROUTINE + 1);
        assert_eq!(vm.current_context().unwrap().result, ResultTarget::Discard);
    }

    #[test]
    fn test_static_memory_is_read_only_to_zcode() {
        let mut vm = create_test_vm(3);
        let limit = vm.header.base_static_mem as u32;
        vm.write_byte(limit - 1, 1).unwrap();
        assert_eq!(
            vm.write_byte(limit, 1),
            Err(VmError::StaticMemoryWrite {
                address: limit,
                limit
            })
        );
        assert!(vm.write_word(limit - 1, 1).is_err());
        assert!(vm.read_byte(limit).is_ok());
    }

    #[test]
    fn test_catch_and_throw() {
        let mut vm = create_test_vm(5);
        let outer = packed(&vm, ROUTINE);
        let inner = packed(&vm, ROUTINE + 0x20);
        vm.call(outer, &[], ResultTarget::Store(0x10)).unwrap();
        let frame = vm.catch_frame();
        assert_eq!(frame, 1);
        vm.push(5).unwrap();
        vm.call(inner, &[], ResultTarget::Discard).unwrap();
        vm.call(inner, &[], ResultTarget::Discard).unwrap();
        vm.throw(9, frame).unwrap();
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.read_global(0x10).unwrap(), 9);
        assert!(matches!(
            vm.throw(1, 3),
            Err(VmError::InvalidCatchFrame { frame: 3, depth: 0 })
        ));
    }
}
