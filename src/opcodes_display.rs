/// Display and text output operations
///
/// This module handles all display-related operations including:
/// - Text output (print, print_ret, print_char, print_num, print_addr,
///   print_paddr, print_obj, print_unicode, print_table)
/// - Window management (split_window, set_window, erase_window, erase_line)
/// - Cursor control (set_cursor, get_cursor)
/// - Styling (set_text_style, set_colour, set_true_colour, set_font)
/// - Output control (new_line, show_status, buffer_mode) and sound_effect
/// - The version 6 picture, window and mouse opcodes, which report that
///   nothing is available
///
/// Text goes through the output streams in `opcodes_io`, so stream 3 can
/// capture it; screen model calls go straight to the display.
use crate::display_trait::ZMachineDisplay;
use crate::error::VmResult;
use crate::header;
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use crate::zobject::ObjectSystem;
use log::debug;

/// Global holding the player's location object
const LOCATION_GLOBAL: u8 = 0x10;
/// Flags 1 bit marking a v3 "time game" status line
const FLAGS1_TIME_GAME: u8 = 0x02;

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle display and output opcodes
    pub fn execute_display_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let a = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.info.op {
            // ---- TEXT ----
            Op::Print => {
                if let Some(addr) = inst.text_addr {
                    self.print_zstring(addr)?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::PrintRet => {
                if let Some(addr) = inst.text_addr {
                    self.print_zstring(addr)?;
                }
                self.output_text("\n")?;
                self.do_return(1)
            }
            Op::NewLine => {
                self.output_text("\n")?;
                Ok(ExecutionResult::Continue)
            }
            Op::PrintAddr => {
                self.print_zstring(a as u32)?;
                Ok(ExecutionResult::Continue)
            }
            Op::PrintPaddr => {
                let addr = self.vm.unpack_string_address(a);
                self.print_zstring(addr)?;
                Ok(ExecutionResult::Continue)
            }
            Op::PrintObj => {
                if let Some(addr) = self.vm.short_name_addr(a)? {
                    self.print_zstring(addr)?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::PrintChar => {
                if let Some(ch) = self.codec.zscii_to_char(a) {
                    self.output_char(ch)?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::PrintNum => {
                self.output_text(&(a as i16).to_string())?;
                Ok(ExecutionResult::Continue)
            }
            Op::PrintUnicode => {
                self.output_char(char::from_u32(a as u32).unwrap_or('?'))?;
                Ok(ExecutionResult::Continue)
            }
            Op::CheckUnicode => {
                let support = match char::from_u32(a as u32) {
                    Some(ch) if !ch.is_control() => {
                        // Bit 0: can print, bit 1: can be typed
                        if self.codec.char_to_zscii(ch).is_some() {
                            3
                        } else {
                            1
                        }
                    }
                    _ => 0,
                };
                self.store_result(inst, support)?;
                Ok(ExecutionResult::Continue)
            }
            Op::PrintTable => {
                let height = if operands.len() > 2 { operands[2] } else { 1 };
                self.print_table(a as u32, b, height, arg(operands, 3))?;
                Ok(ExecutionResult::Continue)
            }

            // ---- SCREEN MODEL ----
            Op::ShowStatus => {
                self.refresh_status_line()?;
                Ok(ExecutionResult::Continue)
            }
            Op::SplitWindow => {
                debug!("split_window {}", a);
                self.display.split_window(a)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SetWindow => {
                self.display.set_window(a as u8)?;
                Ok(ExecutionResult::Continue)
            }
            Op::EraseWindow => {
                self.display.erase_window(a as i16)?;
                Ok(ExecutionResult::Continue)
            }
            Op::EraseLine => {
                if a == 1 {
                    self.display.erase_line()?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::SetCursor => {
                // A negative line turns the cursor on or off in v6
                if (a as i16) > 0 {
                    self.display.set_cursor(a, b)?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::GetCursor => {
                let (line, column) = self.display.get_cursor()?;
                self.vm.write_word(a as u32, line)?;
                self.vm.write_word(a as u32 + 2, column)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SetTextStyle => {
                self.display.set_text_style(a)?;
                Ok(ExecutionResult::Continue)
            }
            Op::BufferMode => {
                self.display.set_buffer_mode(a != 0)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SetColour => {
                self.display.set_colour(a, b)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SetTrueColour => {
                self.display.set_true_colour(a as i16, b as i16)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SetFont => {
                let previous = self.font;
                let result = if a == 0 {
                    previous
                } else if self.display.set_font(a)? {
                    self.font = a;
                    previous
                } else {
                    0
                };
                debug!("set_font {} -> {}", a, result);
                self.store_result(inst, result)?;
                Ok(ExecutionResult::Continue)
            }
            Op::SoundEffect => {
                let number = if operands.is_empty() { 1 } else { a };
                self.display.sound_effect(number, b, arg(operands, 2))?;
                Ok(ExecutionResult::Continue)
            }

            // ---- VERSION 6 ----
            Op::PictureData | Op::MakeMenu => self.branch_on(inst, false),
            Op::GetWindProp | Op::BufferScreen => {
                self.store_result(inst, 0)?;
                Ok(ExecutionResult::Continue)
            }
            Op::ReadMouse => {
                for i in 0..4 {
                    self.vm.write_word(a as u32 + 2 * i, 0)?;
                }
                Ok(ExecutionResult::Continue)
            }
            Op::DrawPicture
            | Op::ErasePicture
            | Op::SetMargins
            | Op::MoveWindow
            | Op::WindowSize
            | Op::WindowStyle
            | Op::ScrollWindow
            | Op::MouseWindow
            | Op::PutWindProp
            | Op::PrintForm
            | Op::PictureTable => {
                debug!("{} ignored", inst.name());
                Ok(ExecutionResult::Continue)
            }
            _ => Err(self.illegal(inst)),
        }
    }

    fn print_zstring(&mut self, addr: u32) -> VmResult<()> {
        let (text, _) = self.codec.decode(&self.vm.memory, addr)?;
        self.output_text(&text)
    }

    /// Print a rectangle of ZSCII text, `skip` bytes between rows
    fn print_table(&mut self, table: u32, width: u16, height: u16, skip: u16) -> VmResult<()> {
        let mut addr = table;
        for row in 0..height {
            if row > 0 {
                self.output_text("\n")?;
            }
            let mut line = String::with_capacity(width as usize);
            for _ in 0..width {
                let code = self.vm.read_byte(addr)?;
                if let Some(ch) = self.codec.zscii_to_char(code as u16) {
                    line.push(ch);
                }
                addr += 1;
            }
            self.output_text(&line)?;
            addr += skip as u32;
        }
        Ok(())
    }

    /// Redraw the v3 status line from the location, score and moves globals.
    /// Later versions draw their own status in the upper window.
    pub(crate) fn refresh_status_line(&mut self) -> VmResult<()> {
        if self.vm.version() > 3 {
            return Ok(());
        }
        let location = self.vm.read_global(LOCATION_GLOBAL)?;
        let name = match self.vm.short_name_addr(location)? {
            Some(addr) => self.codec.decode(&self.vm.memory, addr)?.0,
            None => String::new(),
        };
        let left = self.vm.read_global(LOCATION_GLOBAL + 1)? as i16;
        let right = self.vm.read_global(LOCATION_GLOBAL + 2)?;
        let time_game = self.vm.read_byte(header::FLAGS1)? & FLAGS1_TIME_GAME != 0;
        debug!("status: '{}' {} {} (time game: {})", name, left, right, time_game);
        self.display.show_status(&name, left, right, time_game)?;
        Ok(())
    }
}
