//! Host display interface used by the output opcodes
//!
//! The engine never touches a terminal itself. Every screen, transcript and
//! sound effect goes through this trait, so the same story can run against
//! a terminal, a test capture buffer or a logging wrapper.

use std::fmt;

/// Core trait for Z-Machine display operations
pub trait ZMachineDisplay {
    /// Split the screen into upper and lower windows
    /// In v3: creates a status line
    /// In v4+: creates a multi-line upper window
    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError>;

    /// Set the current window (0 = lower/main, 1 = upper)
    fn set_window(&mut self, window: u8) -> Result<(), DisplayError>;

    /// Set cursor position (1-based coordinates)
    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError>;

    /// Print text to the current window
    fn print(&mut self, text: &str) -> Result<(), DisplayError>;

    /// Print a single character to the current window
    fn print_char(&mut self, ch: char) -> Result<(), DisplayError> {
        let mut buf = [0u8; 4];
        self.print(ch.encode_utf8(&mut buf))
    }

    /// Erase a window (-1 = unsplit and clear, -2 = clear all, 0 = lower, 1 = upper)
    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError>;

    /// Erase from cursor to end of line (v4+)
    fn erase_line(&mut self) -> Result<(), DisplayError>;

    /// Get current cursor position as (line, column), 1-based
    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError>;

    /// Set buffer mode (v4+)
    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), DisplayError>;

    /// Set text style (0 = normal, 1 = reverse, 2 = bold, 4 = italic, 8 = fixed)
    /// Multiple styles can be combined with bitwise OR
    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError>;

    /// Show the v3 status line. For time games `left`/`right` are hours and
    /// minutes, otherwise score and moves.
    fn show_status(
        &mut self,
        location: &str,
        left: i16,
        right: u16,
        time_game: bool,
    ) -> Result<(), DisplayError>;

    /// Print input echo immediately (for real-time feedback during input)
    fn print_input_echo(&mut self, text: &str) -> Result<(), DisplayError> {
        self.print(text)
    }

    /// Colours use the standard numbering (1 = default, 2 = black, ... 9 = white)
    fn set_colour(&mut self, _foreground: u16, _background: u16) -> Result<(), DisplayError> {
        Ok(())
    }

    /// 15-bit true colours, -1 meaning default
    fn set_true_colour(&mut self, _foreground: i16, _background: i16) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Returns whether the font is available
    fn set_font(&mut self, font: u16) -> Result<bool, DisplayError> {
        Ok(font == 1 || font == 4)
    }

    fn sound_effect(&mut self, _number: u16, _effect: u16, _volume: u16) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Output stream 2
    fn transcript(&mut self, _text: &str) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Output stream 4, one call per line of player input
    fn command_record(&mut self, _line: &str) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Get the current terminal dimensions as (width, height)
    fn get_terminal_size(&self) -> (u16, u16);

    /// Push pending output to the host, called before the engine blocks on input
    fn force_refresh(&mut self) -> Result<(), DisplayError>;
}

/// Display error type
#[derive(Debug, Clone)]
pub struct DisplayError {
    pub message: String,
}

impl DisplayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Display error: {}", self.message)
    }
}

impl std::error::Error for DisplayError {}

impl From<std::io::Error> for DisplayError {
    fn from(error: std::io::Error) -> Self {
        Self::new(format!("I/O error: {}", error))
    }
}
