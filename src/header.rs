use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::config::EngineConfig;
use crate::error::{VmError, VmResult};
use crate::memory::Memory;
use log::debug;

pub const HEADER_SIZE: usize = 64;

// Byte offsets of the header fields
pub const VERSION: u32 = 0x00;
pub const FLAGS1: u32 = 0x01;
pub const RELEASE: u32 = 0x02;
pub const HIGH_MEMORY: u32 = 0x04;
pub const INITIAL_PC: u32 = 0x06;
pub const DICTIONARY: u32 = 0x08;
pub const OBJECT_TABLE: u32 = 0x0A;
pub const GLOBALS: u32 = 0x0C;
pub const STATIC_MEMORY: u32 = 0x0E;
pub const FLAGS2: u32 = 0x10;
pub const SERIAL: u32 = 0x12;
pub const ABBREVIATIONS: u32 = 0x18;
pub const FILE_LENGTH: u32 = 0x1A;
pub const CHECKSUM: u32 = 0x1C;
pub const INTERPRETER_NUMBER: u32 = 0x1E;
pub const INTERPRETER_VERSION: u32 = 0x1F;
pub const SCREEN_HEIGHT: u32 = 0x20;
pub const SCREEN_WIDTH: u32 = 0x21;
pub const SCREEN_WIDTH_UNITS: u32 = 0x22;
pub const SCREEN_HEIGHT_UNITS: u32 = 0x24;
pub const FONT_WIDTH_V5: u32 = 0x26;
pub const FONT_HEIGHT_V5: u32 = 0x27;
pub const ROUTINES_OFFSET: u32 = 0x28;
pub const STRINGS_OFFSET: u32 = 0x2A;
pub const DEFAULT_BACKGROUND: u32 = 0x2C;
pub const DEFAULT_FOREGROUND: u32 = 0x2D;
pub const TERMINATING_CHARS: u32 = 0x2E;
pub const STANDARD_REVISION: u32 = 0x32;
pub const ALPHABET_TABLE: u32 = 0x34;
pub const HEADER_EXTENSION: u32 = 0x36;

// Flags 2 bits preserved across restart and restore
pub const FLAGS2_TRANSCRIPT: u16 = 0x0001;
pub const FLAGS2_FIXED_PITCH: u16 = 0x0002;

/// Fixed-offset view of the story header, re-derived whenever the story is
/// loaded, restarted, or restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub flags1: u8,
    pub release: u16,
    pub serial: String,
    pub base_high_mem: u16,
    pub base_static_mem: u16,
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table_addr: u16,
    pub global_variables: u16,
    pub flags2: u16,
    pub abbrev_table: u16,
    pub len_file: usize,
    pub checksum_file: u16,
    /// Routine offset (v6-7), in units of 8 bytes
    pub routines_offset: u16,
    /// Static strings offset (v6-7), in units of 8 bytes
    pub strings_offset: u16,
    pub terminating_chars: u16,
    pub alphabet_table: u16,
    pub header_extension: u16,
}

impl Header {
    pub fn new(memory: &Memory) -> VmResult<Header> {
        if memory.len() < HEADER_SIZE {
            return Err(VmError::InvalidStory(format!(
                "story is {} bytes, smaller than the {} byte header",
                memory.len(),
                HEADER_SIZE
            )));
        }
        let version = memory.read_byte(VERSION)?;
        if !(1..=8).contains(&version) {
            return Err(VmError::UnsupportedVersion(version));
        }

        let serial = memory
            .slice(SERIAL, 6)?
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect();

        let file_scale = match version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };

        let header = Header {
            version,
            flags1: memory.read_byte(FLAGS1)?,
            release: memory.read_word(RELEASE)?,
            serial,
            base_high_mem: memory.read_word(HIGH_MEMORY)?,
            base_static_mem: memory.read_word(STATIC_MEMORY)?,
            initial_pc: memory.read_word(INITIAL_PC)?,
            dictionary: memory.read_word(DICTIONARY)?,
            object_table_addr: memory.read_word(OBJECT_TABLE)?,
            global_variables: memory.read_word(GLOBALS)?,
            flags2: memory.read_word(FLAGS2)?,
            abbrev_table: memory.read_word(ABBREVIATIONS)?,
            len_file: memory.read_word(FILE_LENGTH)? as usize * file_scale,
            checksum_file: memory.read_word(CHECKSUM)?,
            routines_offset: memory.read_word(ROUTINES_OFFSET)?,
            strings_offset: memory.read_word(STRINGS_OFFSET)?,
            terminating_chars: memory.read_word(TERMINATING_CHARS)?,
            alphabet_table: memory.read_word(ALPHABET_TABLE)?,
            header_extension: memory.read_word(HEADER_EXTENSION)?,
        };

        if header.base_static_mem as usize > memory.len() {
            return Err(VmError::InvalidStory(format!(
                "static memory base {:#06x} lies beyond the end of the story",
                header.base_static_mem
            )));
        }
        Ok(header)
    }

    /// Address of the unicode translation table from the header extension, if any
    pub fn unicode_table(&self, memory: &Memory) -> Option<u32> {
        self.extension_word(memory, 3)
            .filter(|&addr| addr != 0)
            .map(|addr| addr as u32)
    }

    /// Word `index` of the header extension table (index 0 is the table size)
    pub fn extension_word(&self, memory: &Memory, index: u16) -> Option<u16> {
        if self.version < 5 || self.header_extension == 0 {
            return None;
        }
        let table = self.header_extension as u32;
        let size = memory.read_word(table).ok()?;
        if index > size {
            return None;
        }
        memory.read_word(table + 2 * index as u32).ok()
    }

    /// Fill in the fields the interpreter owns. Called at start-up and after
    /// every restart or restore.
    pub fn write_interpreter_fields(
        memory: &mut Memory,
        version: u8,
        config: &EngineConfig,
    ) -> VmResult<()> {
        let mut flags1 = memory.read_byte(FLAGS1)?;
        if version <= 3 {
            // Status line available (bit 4 clear), split screen available,
            // variable-pitch font is not the default
            flags1 &= !0x10;
            flags1 |= 0x20;
            flags1 &= !0x40;
        } else {
            // Colours, bold, italic, fixed-space and timed input
            flags1 |= 0x01 | 0x04 | 0x08 | 0x10 | 0x80;
            // No picture display, no sound effects
            flags1 &= !0x02;
            flags1 &= !0x20;
        }
        memory.write_byte(FLAGS1, flags1)?;

        // Clear capabilities we never offer: pictures, mouse, sound, menus.
        // Undo (bit 4) stays as the story requested it.
        let flags2 = memory.read_word(FLAGS2)?;
        memory.write_word(FLAGS2, flags2 & !(0x0008 | 0x0020 | 0x0080 | 0x0100))?;

        if version >= 4 {
            memory.write_byte(INTERPRETER_NUMBER, config.interpreter.number)?;
            memory.write_byte(INTERPRETER_VERSION, config.interpreter.revision as u8)?;
            memory.write_byte(SCREEN_HEIGHT, config.screen.height)?;
            memory.write_byte(SCREEN_WIDTH, config.screen.width)?;
        }
        if version >= 5 {
            memory.write_word(SCREEN_WIDTH_UNITS, config.screen.width as u16)?;
            memory.write_word(SCREEN_HEIGHT_UNITS, config.screen.height as u16)?;
            // One unit per character cell; v6 swaps the two font bytes
            memory.write_byte(FONT_WIDTH_V5, 1)?;
            memory.write_byte(FONT_HEIGHT_V5, 1)?;
            memory.write_byte(DEFAULT_BACKGROUND, 2)?;
            memory.write_byte(DEFAULT_FOREGROUND, 9)?;
        }
        memory.write_word(STANDARD_REVISION, 0x0101)?;

        debug!(
            "Interpreter header fields written: v{} screen {}x{} interpreter {}/{}",
            version,
            config.screen.width,
            config.screen.height,
            config.interpreter.number,
            config.interpreter.revision
        );
        Ok(())
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Interpreter flags:        {:#04x}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Game flags:               {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.flags1,
            self.release,
            self.base_high_mem,
            self.initial_pc,
            self.dictionary,
            self.object_table_addr,
            self.global_variables,
            self.base_static_mem,
            self.flags2,
            self.serial,
            self.abbrev_table,
            self.len_file,
            self.checksum_file,
        )
    }
}
