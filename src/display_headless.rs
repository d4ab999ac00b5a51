//! Headless display implementation for testing and piped use
//!
//! Collects all output without displaying it. Window and status operations
//! are recorded so tests can assert on them.

use crate::display_trait::{DisplayError, ZMachineDisplay};
use log::debug;

#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    buffer: Vec<String>,
    current_line: String,
    cursor: (u16, u16),
    upper_window_lines: u16,
    current_window: u8,
    text_style: u16,
    terminal_width: u16,
    terminal_height: u16,
    status: Option<String>,
    transcript: String,
    commands: Vec<String>,
    sounds: Vec<u16>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::with_size(80, 24)
    }

    pub fn with_size(width: u16, height: u16) -> Self {
        Self {
            cursor: (1, 1),
            terminal_width: width,
            terminal_height: height,
            ..Default::default()
        }
    }

    /// Get the completed lines (for testing)
    pub fn get_buffer(&self) -> &[String] {
        &self.buffer
    }

    /// Get all output as a single string
    pub fn get_output(&self) -> String {
        let mut output = self.buffer.join("\n");
        if !self.current_line.is_empty() {
            if !self.buffer.is_empty() {
                output.push('\n');
            }
            output.push_str(&self.current_line);
        }
        output
    }

    /// Take the output so far, leaving the display empty
    pub fn take_output(&mut self) -> String {
        let output = self.get_output();
        self.buffer.clear();
        self.current_line.clear();
        output
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn transcript_text(&self) -> &str {
        &self.transcript
    }

    pub fn recorded_commands(&self) -> &[String] {
        &self.commands
    }

    pub fn sounds(&self) -> &[u16] {
        &self.sounds
    }

    pub fn upper_window_lines(&self) -> u16 {
        self.upper_window_lines
    }

    pub fn current_window(&self) -> u8 {
        self.current_window
    }

    pub fn text_style(&self) -> u16 {
        self.text_style
    }

    fn flush_line(&mut self) {
        self.buffer.push(std::mem::take(&mut self.current_line));
    }
}

impl ZMachineDisplay for HeadlessDisplay {
    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError> {
        debug!("Headless: split_window({})", lines);
        self.upper_window_lines = lines;
        Ok(())
    }

    fn set_window(&mut self, window: u8) -> Result<(), DisplayError> {
        debug!("Headless: set_window({})", window);
        self.current_window = window;
        if window == 1 {
            self.cursor = (1, 1);
        }
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError> {
        debug!("Headless: set_cursor({}, {})", line, column);
        self.cursor = (line, column);
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.current_line.push_str(first);
        }
        for line in lines {
            self.flush_line();
            self.current_line.push_str(line);
        }
        Ok(())
    }

    fn print_char(&mut self, ch: char) -> Result<(), DisplayError> {
        if ch == '\n' {
            self.flush_line();
        } else {
            self.current_line.push(ch);
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError> {
        debug!("Headless: erase_window({})", window);
        if window == -1 {
            self.upper_window_lines = 0;
            self.current_window = 0;
        }
        if window != 1 {
            self.buffer.clear();
            self.current_line.clear();
        }
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError> {
        Ok(self.cursor)
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError> {
        self.text_style = if style == 0 { 0 } else { self.text_style | style };
        Ok(())
    }

    fn show_status(
        &mut self,
        location: &str,
        left: i16,
        right: u16,
        time_game: bool,
    ) -> Result<(), DisplayError> {
        self.status = Some(if time_game {
            format!("{} Time: {}:{:02}", location, left, right)
        } else {
            format!("{} Score: {} Moves: {}", location, left, right)
        });
        Ok(())
    }

    fn sound_effect(&mut self, number: u16, _effect: u16, _volume: u16) -> Result<(), DisplayError> {
        self.sounds.push(number);
        Ok(())
    }

    fn transcript(&mut self, text: &str) -> Result<(), DisplayError> {
        self.transcript.push_str(text);
        Ok(())
    }

    fn command_record(&mut self, line: &str) -> Result<(), DisplayError> {
        self.commands.push(line.to_string());
        Ok(())
    }

    fn get_terminal_size(&self) -> (u16, u16) {
        (self.terminal_width, self.terminal_height)
    }

    fn force_refresh(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_output_is_split_into_lines() {
        let mut display = HeadlessDisplay::new();
        display.print("West of House\nYou are").unwrap();
        display.print_char(' ').unwrap();
        display.print("standing").unwrap();
        display.print_char('\n').unwrap();
        assert_eq!(display.get_buffer(), &["West of House", "You are standing"]);
        assert_eq!(display.get_output(), "West of House\nYou are standing");
    }

    #[test]
    fn test_take_output_clears() {
        let mut display = HeadlessDisplay::new();
        display.print("hello").unwrap();
        assert_eq!(display.take_output(), "hello");
        assert_eq!(display.get_output(), "");
    }

    #[test]
    fn test_status_line_formats() {
        let mut display = HeadlessDisplay::new();
        display.show_status("Kitchen", 10, 42, false).unwrap();
        assert_eq!(display.status_line(), Some("Kitchen Score: 10 Moves: 42"));
        display.show_status("Kitchen", 9, 5, true).unwrap();
        assert_eq!(display.status_line(), Some("Kitchen Time: 9:05"));
    }

    #[test]
    fn test_erase_window_minus_one_unsplits() {
        let mut display = HeadlessDisplay::new();
        display.split_window(3).unwrap();
        display.set_window(1).unwrap();
        display.print("text").unwrap();
        display.erase_window(-1).unwrap();
        assert_eq!(display.upper_window_lines(), 0);
        assert_eq!(display.current_window(), 0);
        assert_eq!(display.get_output(), "");
    }
}
