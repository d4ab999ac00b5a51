//! Snapshot of everything needed to resume a story: dynamic memory, the PC
//! and both stacks. How a snapshot is persisted belongs to the `SaveStore`
//! the host plugs in; the engine only hands states over and takes them back.

use crate::error::{VmError, VmResult};
use crate::header::{self, Header};
use crate::routine::RoutineContext;
use crate::vm::VM;
use log::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveState {
    pub release: u16,
    pub serial: String,
    pub checksum: u16,
    /// Bytes 0..static_mem_base at the time of the save
    pub dynamic_memory: Vec<u8>,
    /// Address of the instruction that made the snapshot; a restore resumes
    /// by completing that instruction
    pub save_pc: u32,
    pub stack: Vec<u16>,
    pub contexts: Vec<RoutineContext>,
}

impl SaveState {
    pub fn from_vm(vm: &VM, save_pc: u32) -> VmResult<Self> {
        let dynamic_size = vm.header.base_static_mem as usize;
        let dynamic_memory = vm.memory.slice(0, dynamic_size)?.to_vec();
        debug!(
            "snapshot at {:05x}: {} bytes dynamic memory, stack {}, {} contexts",
            save_pc,
            dynamic_memory.len(),
            vm.stack_depth(),
            vm.call_depth()
        );
        Ok(SaveState {
            release: vm.header.release,
            serial: vm.header.serial.clone(),
            checksum: vm.header.checksum_file,
            dynamic_memory,
            save_pc,
            stack: vm.stack().to_vec(),
            contexts: vm.contexts().to_vec(),
        })
    }

    /// Whether this snapshot was taken from the story now running
    pub fn matches(&self, header: &Header) -> bool {
        self.release == header.release
            && self.serial == header.serial
            && self.checksum == header.checksum_file
    }

    /// Put the snapshot back into the VM. The transcript and fixed-pitch
    /// bits of flags2 belong to the player and survive the restore. The PC
    /// is left at the saving instruction.
    pub fn restore_into(&self, vm: &mut VM) -> VmResult<()> {
        if !self.matches(&vm.header) {
            return Err(VmError::InvalidStory(format!(
                "saved state is for release {} serial {}",
                self.release, self.serial
            )));
        }
        if self.dynamic_memory.len() != vm.header.base_static_mem as usize {
            return Err(VmError::InvalidStory(format!(
                "saved state has {} bytes of dynamic memory, story has {}",
                self.dynamic_memory.len(),
                vm.header.base_static_mem
            )));
        }
        let kept = vm.memory.read_word(header::FLAGS2)? & PRESERVED_FLAGS2;
        vm.memory.load_prefix(&self.dynamic_memory)?;
        let flags2 = vm.memory.read_word(header::FLAGS2)? & !PRESERVED_FLAGS2;
        vm.memory.write_word(header::FLAGS2, flags2 | kept)?;
        vm.refresh_header()?;
        vm.replace_stacks(self.stack.clone(), self.contexts.clone());
        vm.pc = self.save_pc;
        info!("restored state saved at {:05x}", self.save_pc);
        Ok(())
    }
}

/// Flags2 bits that survive restart and restore
pub const PRESERVED_FLAGS2: u16 = header::FLAGS2_TRANSCRIPT | header::FLAGS2_FIXED_PITCH;

/// Where `save` and `restore` keep their states
pub trait SaveStore {
    /// Returns false when the state could not be stored
    fn save(&mut self, state: &SaveState) -> bool;
    fn restore(&mut self) -> Option<SaveState>;
}

/// Keeps the most recent save in memory
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    slot: Option<SaveState>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_save(&self) -> bool {
        self.slot.is_some()
    }
}

impl SaveStore for MemorySaveStore {
    fn save(&mut self, state: &SaveState) -> bool {
        self.slot = Some(state.clone());
        true
    }

    fn restore(&mut self) -> Option<SaveState> {
        if self.slot.is_none() {
            warn!("restore requested but nothing has been saved");
        }
        self.slot.clone()
    }
}
