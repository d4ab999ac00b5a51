/// Input/Output operations
///
/// This module handles all I/O-related operations including:
/// - Text input (sread/aread) and character input (read_char), with the
///   optional timed interrupt
/// - Lexical analysis (tokenise, encode_text)
/// - Stream management (output_stream, input_stream)
///
/// Reads never block. The opcode records an `InputRequest` and suspends the
/// run; the host answers through `provide_line`, `provide_char` or
/// `fire_timer`, and `run` picks up after the read instruction.
use crate::display_trait::ZMachineDisplay;
use crate::error::{VmError, VmResult};
use crate::header::{self, FLAGS2_TRANSCRIPT};
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use crate::text::ZSCII_NEWLINE;
use crate::timed_input::{InputMode, InputRequest, RunState, TimedInterrupt};
use log::{debug, warn};

/// Stream 3 tables may be nested this deep
const MAX_MEMORY_STREAMS: usize = 16;

/// Which output streams are selected. Stream 2 lives in the flags2
/// transcript bit, since stories may set it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStreams {
    pub screen: bool,
    /// Active stream 3 tables, innermost last
    memory_tables: Vec<u32>,
    pub command_record: bool,
}

impl Default for OutputStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStreams {
    pub fn new() -> Self {
        OutputStreams {
            screen: true,
            memory_tables: Vec::new(),
            command_record: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Table currently capturing output, if stream 3 is selected
    pub fn memory_table(&self) -> Option<u32> {
        self.memory_tables.last().copied()
    }
}

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle I/O system opcodes
    pub fn execute_io_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let a = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.info.op {
            // ---- INPUT ----
            Op::Read => self.begin_line_read(inst, operands),
            Op::ReadChar => {
                if a != 1 {
                    warn!("read_char from device {}", a);
                }
                let timer =
                    TimedInterrupt::from_operands(operands.get(1).copied(), operands.get(2).copied());
                self.suspend_for(InputRequest {
                    mode: InputMode::Char,
                    store_var: inst.store_var,
                    timer,
                })
            }
            Op::InputStream => {
                if a != 0 {
                    warn!("input_stream {} is not supported; keeping the keyboard", a);
                }
                Ok(ExecutionResult::Continue)
            }

            // ---- LEXICAL ----
            Op::Tokenise => {
                let dictionary = match arg(operands, 2) {
                    0 => self.vm.header.dictionary,
                    addr => addr,
                };
                let skip_unknown = arg(operands, 3) != 0;
                self.vm
                    .tokenise(&self.codec, a as u32, b as u32, dictionary as u32, skip_unknown)?;
                Ok(ExecutionResult::Continue)
            }
            Op::EncodeText => {
                let text = a as u32 + arg(operands, 2) as u32;
                let zscii = self.vm.memory.slice(text, b as usize)?.to_vec();
                let encoded = self.codec.encode_zscii_word(&zscii);
                let dest = arg(operands, 3) as u32;
                for (i, byte) in encoded.into_iter().enumerate() {
                    self.vm.write_byte(dest + i as u32, byte)?;
                }
                Ok(ExecutionResult::Continue)
            }

            // ---- OUTPUT STREAMS ----
            Op::OutputStream => {
                self.select_output_stream(a as i16, b as u32)?;
                Ok(ExecutionResult::Continue)
            }
            _ => Err(self.illegal(inst)),
        }
    }

    fn begin_line_read(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let text_buffer = arg(operands, 0) as u32;
        let parse_buffer = arg(operands, 1) as u32;
        let version = self.vm.version();
        if version <= 3 {
            self.refresh_status_line()?;
        }

        let capacity = self.vm.read_byte(text_buffer)? as usize;
        let (max_len, preloaded) = if version <= 4 {
            // Byte 0 also counts the terminating zero
            (capacity.saturating_sub(1), 0)
        } else {
            let preloaded = self.vm.read_byte(text_buffer + 1)? as usize;
            (capacity, preloaded.min(capacity))
        };
        let timer = TimedInterrupt::from_operands(operands.get(2).copied(), operands.get(3).copied());
        debug!(
            "read: text {:04x} parse {:04x} max {} preloaded {} timer {:?}",
            text_buffer, parse_buffer, max_len, preloaded, timer
        );
        self.suspend_for(InputRequest {
            mode: InputMode::Line {
                text_buffer,
                parse_buffer,
                max_len,
                preloaded,
            },
            store_var: inst.store_var,
            timer,
        })
    }

    fn suspend_for(&mut self, request: InputRequest) -> VmResult<ExecutionResult> {
        self.run_state = RunState::WaitingForInput(request);
        self.display.force_refresh()?;
        Ok(ExecutionResult::Suspended)
    }

    fn select_output_stream(&mut self, stream: i16, table: u32) -> VmResult<()> {
        debug!("output_stream {}", stream);
        match stream {
            0 => {}
            1 => self.streams.screen = true,
            -1 => self.streams.screen = false,
            2 | -2 => {
                let flags2 = self.vm.read_word(header::FLAGS2)?;
                let flags2 = if stream > 0 {
                    flags2 | FLAGS2_TRANSCRIPT
                } else {
                    flags2 & !FLAGS2_TRANSCRIPT
                };
                self.vm.write_word(header::FLAGS2, flags2)?;
            }
            3 => {
                if self.streams.memory_tables.len() >= MAX_MEMORY_STREAMS {
                    warn!("output_stream 3 nested deeper than {}", MAX_MEMORY_STREAMS);
                    return Ok(());
                }
                self.vm.write_word(table, 0)?;
                self.streams.memory_tables.push(table);
            }
            -3 => {
                if self.streams.memory_tables.pop().is_none() {
                    warn!("output_stream -3 with no table selected");
                }
            }
            4 => self.streams.command_record = true,
            -4 => self.streams.command_record = false,
            _ => warn!("output_stream {} does not exist", stream),
        }
        Ok(())
    }

    fn transcript_on(&self) -> VmResult<bool> {
        Ok(self.vm.read_word(header::FLAGS2)? & FLAGS2_TRANSCRIPT != 0)
    }

    /// Send text to the selected output streams. While a stream 3 table is
    /// selected it receives the text as ZSCII and nothing else does.
    pub(crate) fn output_text(&mut self, text: &str) -> VmResult<()> {
        if let Some(table) = self.streams.memory_table() {
            let mut count = self.vm.read_word(table)?;
            for ch in text.chars() {
                let code = self.codec.char_to_zscii(ch).unwrap_or(b'?');
                self.vm.write_byte(table + 2 + count as u32, code)?;
                count = count.wrapping_add(1);
            }
            return self.vm.write_word(table, count);
        }
        if self.streams.screen {
            self.display.print(text)?;
        }
        if self.transcript_on()? {
            self.display.transcript(text)?;
        }
        Ok(())
    }

    pub(crate) fn output_char(&mut self, ch: char) -> VmResult<()> {
        let mut buf = [0u8; 4];
        self.output_text(ch.encode_utf8(&mut buf))
    }

    // ========================================================================
    // HOST ENTRY POINTS
    // ========================================================================

    fn pending_request(&self) -> VmResult<InputRequest> {
        self.run_state
            .input_request()
            .cloned()
            .ok_or(VmError::InvalidRunState("no input is pending"))
    }

    /// Complete a pending line read with `input` and resume running
    pub fn provide_line(&mut self, input: &str) -> VmResult<()> {
        let request = self.pending_request()?;
        let InputMode::Line {
            text_buffer,
            parse_buffer,
            max_len,
            preloaded,
        } = request.mode
        else {
            return Err(VmError::InvalidRunState("a character read is pending"));
        };

        let line = input.trim_end_matches(['\r', '\n']).to_lowercase();
        let mut zscii: Vec<u8> = line
            .chars()
            .filter_map(|ch| self.codec.char_to_zscii(ch))
            .filter(|&code| code != ZSCII_NEWLINE)
            .collect();
        zscii.truncate(max_len.saturating_sub(preloaded));
        debug!("line input {:?} ({} chars)", line, zscii.len());

        if self.vm.version() <= 4 {
            for (i, &code) in zscii.iter().enumerate() {
                self.vm.write_byte(text_buffer + 1 + i as u32, code)?;
            }
            self.vm.write_byte(text_buffer + 1 + zscii.len() as u32, 0)?;
        } else {
            let start = text_buffer + 2 + preloaded as u32;
            for (i, &code) in zscii.iter().enumerate() {
                self.vm.write_byte(start + i as u32, code)?;
            }
            self.vm
                .write_byte(text_buffer + 1, (preloaded + zscii.len()) as u8)?;
        }

        if self.streams.command_record {
            self.display.command_record(&line)?;
        }
        if self.transcript_on()? {
            self.display.transcript(&format!("{}\n", line))?;
        }
        if parse_buffer != 0 {
            let dictionary = self.vm.header.dictionary as u32;
            self.vm
                .tokenise(&self.codec, text_buffer, parse_buffer, dictionary, false)?;
        }
        if self.vm.version() >= 5 {
            if let Some(var) = request.store_var {
                self.vm.write_variable(var, ZSCII_NEWLINE as u16)?;
            }
        }
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Complete a pending read_char with `ch` and resume running
    pub fn provide_char(&mut self, ch: char) -> VmResult<()> {
        let request = self.pending_request()?;
        if request.mode != InputMode::Char {
            return Err(VmError::InvalidRunState("a line read is pending"));
        }
        let code = self.codec.char_to_zscii(ch).unwrap_or(b'?');
        debug!("char input {:?} -> {}", ch, code);
        if let Some(var) = request.store_var {
            self.vm.write_variable(var, code as u16)?;
        }
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Run the pending read's interrupt routine. When it returns true the
    /// read ends with terminator 0 and an empty line, and `true` is returned;
    /// otherwise the read stays pending.
    pub fn fire_timer(&mut self) -> VmResult<bool> {
        let request = self.pending_request()?;
        let timer = request
            .timer
            .ok_or(VmError::InvalidRunState("the pending read has no timer"))?;
        let result = self.call_nested_routine(timer.routine)?;
        if result == 0 {
            return Ok(false);
        }

        debug!("timer routine ended the read");
        if let InputMode::Line {
            text_buffer,
            parse_buffer,
            ..
        } = request.mode
        {
            // Terminator in v1-4, character count in v5+
            self.vm.write_byte(text_buffer + 1, 0)?;
            if parse_buffer != 0 {
                self.vm.write_byte(parse_buffer + 1, 0)?;
            }
        }
        if let Some(var) = request.store_var {
            self.vm.write_variable(var, 0)?;
        }
        self.run_state = RunState::Running;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::display_headless::HeadlessDisplay;
    use crate::test_utils::StoryBuilder;
    use test_log::test;

    const TEXT: u32 = StoryBuilder::TEXT_BUFFER;
    const PARSE: u32 = StoryBuilder::PARSE_BUFFER;
    const TABLE: u32 = StoryBuilder::SCRATCH;

    fn interpreter(builder: StoryBuilder) -> Interpreter<HeadlessDisplay> {
        Interpreter::new(builder.build(), EngineConfig::default(), HeadlessDisplay::new()).unwrap()
    }

    fn hi(addr: u32) -> u8 {
        (addr >> 8) as u8
    }

    fn lo(addr: u32) -> u8 {
        addr as u8
    }

    #[test]
    fn test_memory_stream_captures_output() {
        let mut code = vec![
            // output_stream #3 TABLE
            0xF3, 0x4F, 0x03, hi(TABLE), lo(TABLE),
            0xB2,
        ];
        code.extend(crate::test_utils::encode_zstring(5, "hi"));
        code.extend_from_slice(&[
            // output_stream #-3
            0xF3, 0x3F, 0xFF, 0xFD,
            0xB2,
        ]);
        code.extend(crate::test_utils::encode_zstring(5, "ok"));
        code.push(0xBA);
        let mut interp = interpreter(StoryBuilder::new(5).main(&code));
        interp.run().unwrap();
        assert_eq!(interp.vm.read_word(TABLE).unwrap(), 2);
        assert_eq!(interp.vm.memory.slice(TABLE + 2, 2).unwrap(), b"hi");
        assert_eq!(interp.display().get_output(), "ok");
    }

    #[test]
    fn test_nested_memory_streams() {
        let mut interp = interpreter(StoryBuilder::new(5).main(&[0xBA]));
        interp.select_output_stream(3, TABLE).unwrap();
        interp.output_text("ab").unwrap();
        interp.select_output_stream(3, TABLE + 0x20).unwrap();
        interp.output_text("c").unwrap();
        interp.select_output_stream(-3, 0).unwrap();
        interp.output_text("d").unwrap();
        interp.select_output_stream(-3, 0).unwrap();
        interp.output_text("e").unwrap();
        assert_eq!(interp.vm.read_word(TABLE).unwrap(), 3);
        assert_eq!(interp.vm.memory.slice(TABLE + 2, 3).unwrap(), b"abd");
        assert_eq!(interp.vm.read_word(TABLE + 0x20).unwrap(), 1);
        assert_eq!(interp.display().get_output(), "e");
    }

    #[test]
    fn test_transcript_and_screen_streams() {
        let mut interp = interpreter(StoryBuilder::new(5).main(&[0xBA]));
        interp.select_output_stream(2, 0).unwrap();
        interp.select_output_stream(-1, 0).unwrap();
        interp.output_text("quiet").unwrap();
        interp.select_output_stream(1, 0).unwrap();
        interp.select_output_stream(-2, 0).unwrap();
        interp.output_text("loud").unwrap();
        assert_eq!(interp.display().transcript_text(), "quiet");
        assert_eq!(interp.display().get_output(), "loud");
        assert_eq!(interp.vm.read_word(header::FLAGS2).unwrap() & FLAGS2_TRANSCRIPT, 0);
    }

    #[test]
    fn test_read_suspends_and_resumes_v3() {
        let story = StoryBuilder::new(3)
            .dictionary(b",", &["take", "lamp"])
            // sread TEXT PARSE; quit
            .main(&[0xE4, 0x0F, hi(TEXT), lo(TEXT), hi(PARSE), lo(PARSE), 0xBA])
            .code(TEXT, &[20])
            .code(PARSE, &[4]);
        let lamp = story.dictionary_entry_addr("lamp").unwrap();
        let mut interp = interpreter(story);

        let state = interp.run().unwrap();
        let request = state.input_request().unwrap();
        assert_eq!(
            request.mode,
            InputMode::Line {
                text_buffer: TEXT,
                parse_buffer: PARSE,
                max_len: 19,
                preloaded: 0
            }
        );
        assert!(interp.display().status_line().is_some());

        interp.provide_line("Take LAMP").unwrap();
        assert_eq!(interp.vm.memory.slice(TEXT + 1, 10).unwrap(), b"take lamp\0");
        assert_eq!(interp.vm.read_byte(PARSE + 1).unwrap(), 2);
        assert_eq!(interp.vm.read_word(PARSE + 6).unwrap(), lamp as u16);
        assert_eq!(interp.run().unwrap(), RunState::Stopped);
    }

    #[test]
    fn test_read_v5_appends_after_preloaded_text_and_stores_terminator() {
        let story = StoryBuilder::new(5)
            // aread TEXT #0 -> G10; quit
            .main(&[0xE4, 0x1F, hi(TEXT), lo(TEXT), 0x00, 0x10, 0xBA])
            .code(TEXT, &[6, 2, b'g', b'o']);
        let mut interp = interpreter(story);
        interp.run().unwrap();
        interp.provide_line(" north").unwrap();
        assert_eq!(interp.vm.read_byte(TEXT + 1).unwrap(), 6);
        assert_eq!(interp.vm.memory.slice(TEXT + 2, 6).unwrap(), b"go nor");
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 13);
    }

    #[test]
    fn test_input_without_pending_read_is_rejected() {
        let mut interp = interpreter(StoryBuilder::new(5).main(&[0xBA]));
        assert!(matches!(
            interp.provide_line("look"),
            Err(VmError::InvalidRunState(_))
        ));
        assert!(matches!(interp.fire_timer(), Err(VmError::InvalidRunState(_))));
    }

    #[test]
    fn test_read_char_and_command_record() {
        let story = StoryBuilder::new(5)
            // output_stream #4; read_char #1 -> G10; quit
            .main(&[0xF3, 0x7F, 0x04, 0xF6, 0x7F, 0x01, 0x10, 0xBA]);
        let mut interp = interpreter(story);
        let state = interp.run().unwrap();
        assert_eq!(state.input_request().unwrap().mode, InputMode::Char);
        assert!(matches!(
            interp.provide_line("x"),
            Err(VmError::InvalidRunState(_))
        ));
        interp.provide_char('y').unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), b'y' as u16);
        assert_eq!(interp.run().unwrap(), RunState::Stopped);
    }

    #[test]
    fn test_timer_routine_can_end_the_read() {
        let v = 5;
        let routine = 0x1000;
        let packed = StoryBuilder::packed(v, routine);
        let story = StoryBuilder::new(v)
            // read_char #1 #10 ROUTINE -> G10; quit
            .main(&[0xF6, 0x53, 0x01, 0x0A, hi(packed as u32), lo(packed as u32), 0x10, 0xBA])
            // inc G11; jg G11 #1 ?rtrue; rfalse
            .routine(routine, 0, &[], &[0x95, 0x11, 0x43, 0x11, 0x01, 0xC1, 0xB1]);
        let mut interp = interpreter(story);
        let state = interp.run().unwrap();
        assert_eq!(
            state.input_request().unwrap().timer,
            Some(TimedInterrupt {
                interval_tenths: 10,
                routine: packed
            })
        );
        let pc = interp.vm.pc;
        assert!(!interp.fire_timer().unwrap());
        assert!(interp.run_state().input_request().is_some());
        assert_eq!(interp.vm.pc, pc);
        assert_eq!(interp.vm.stack_depth(), 0);

        assert!(interp.fire_timer().unwrap());
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 2);
        assert_eq!(interp.run().unwrap(), RunState::Stopped);
    }

    #[test]
    fn test_tokenise_and_encode_text() {
        let story = StoryBuilder::new(5)
            .dictionary(b"", &["open", "door"])
            .code(TEXT, &[20, 9])
            .code(TEXT + 2, b"open door")
            .code(PARSE, &[4])
            .code(TABLE, b"xdoor")
            .main(&[
                // tokenise TEXT PARSE
                0xFB, 0x0F, hi(TEXT), lo(TEXT), hi(PARSE), lo(PARSE),
                // encode_text TABLE #4 #1 TABLE+0x10
                0xFC, 0x14, hi(TABLE), lo(TABLE), 0x04, 0x01, hi(TABLE + 0x10), lo(TABLE + 0x10),
                0xBA,
            ]);
        let door = story.dictionary_entry_addr("door").unwrap();
        let mut interp = interpreter(story);
        interp.run().unwrap();
        assert_eq!(interp.vm.read_byte(PARSE + 1).unwrap(), 2);
        assert_eq!(interp.vm.read_word(PARSE + 6).unwrap(), door as u16);
        assert_eq!(
            interp.vm.memory.slice(TABLE + 0x10, 6).unwrap(),
            &crate::test_utils::encode_dictionary_word(5, "door")[..]
        );
    }
}
