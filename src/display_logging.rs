//! Logging wrapper for display implementations
//!
//! Logs every display operation at debug level before forwarding it.

use crate::display_trait::{DisplayError, ZMachineDisplay};
use log::{debug, info};

pub struct LoggingDisplay {
    inner: Box<dyn ZMachineDisplay>,
    op_count: usize,
}

impl LoggingDisplay {
    pub fn new(inner: Box<dyn ZMachineDisplay>) -> Self {
        info!("display logging started");
        Self { inner, op_count: 0 }
    }

    pub fn op_count(&self) -> usize {
        self.op_count
    }

    fn log_op(&mut self, op: &str) {
        self.op_count += 1;
        debug!("[OP {:04}] {}", self.op_count, op);
    }
}

fn preview(text: &str) -> String {
    text.chars()
        .take(50)
        .collect::<String>()
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

impl ZMachineDisplay for LoggingDisplay {
    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError> {
        self.log_op(&format!("split_window({})", lines));
        self.inner.split_window(lines)
    }

    fn set_window(&mut self, window: u8) -> Result<(), DisplayError> {
        self.log_op(&format!("set_window({})", window));
        self.inner.set_window(window)
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError> {
        self.log_op(&format!("set_cursor({}, {})", line, column));
        self.inner.set_cursor(line, column)
    }

    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        self.log_op(&format!("print('{}')", preview(text)));
        self.inner.print(text)
    }

    fn print_char(&mut self, ch: char) -> Result<(), DisplayError> {
        self.log_op(&format!("print_char({:?})", ch));
        self.inner.print_char(ch)
    }

    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError> {
        self.log_op(&format!("erase_window({})", window));
        self.inner.erase_window(window)
    }

    fn erase_line(&mut self) -> Result<(), DisplayError> {
        self.log_op("erase_line()");
        self.inner.erase_line()
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError> {
        self.log_op("get_cursor()");
        self.inner.get_cursor()
    }

    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), DisplayError> {
        self.log_op(&format!("set_buffer_mode({})", buffered));
        self.inner.set_buffer_mode(buffered)
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError> {
        self.log_op(&format!("set_text_style({})", style));
        self.inner.set_text_style(style)
    }

    fn show_status(
        &mut self,
        location: &str,
        left: i16,
        right: u16,
        time_game: bool,
    ) -> Result<(), DisplayError> {
        self.log_op(&format!(
            "show_status('{}', {}, {}, time={})",
            location, left, right, time_game
        ));
        self.inner.show_status(location, left, right, time_game)
    }

    fn print_input_echo(&mut self, text: &str) -> Result<(), DisplayError> {
        self.log_op(&format!("print_input_echo('{}')", preview(text)));
        self.inner.print_input_echo(text)
    }

    fn set_colour(&mut self, foreground: u16, background: u16) -> Result<(), DisplayError> {
        self.log_op(&format!("set_colour({}, {})", foreground, background));
        self.inner.set_colour(foreground, background)
    }

    fn set_true_colour(&mut self, foreground: i16, background: i16) -> Result<(), DisplayError> {
        self.log_op(&format!("set_true_colour({}, {})", foreground, background));
        self.inner.set_true_colour(foreground, background)
    }

    fn set_font(&mut self, font: u16) -> Result<bool, DisplayError> {
        self.log_op(&format!("set_font({})", font));
        self.inner.set_font(font)
    }

    fn sound_effect(&mut self, number: u16, effect: u16, volume: u16) -> Result<(), DisplayError> {
        self.log_op(&format!("sound_effect({}, {}, {})", number, effect, volume));
        self.inner.sound_effect(number, effect, volume)
    }

    fn transcript(&mut self, text: &str) -> Result<(), DisplayError> {
        self.log_op(&format!("transcript('{}')", preview(text)));
        self.inner.transcript(text)
    }

    fn command_record(&mut self, line: &str) -> Result<(), DisplayError> {
        self.log_op(&format!("command_record('{}')", preview(line)));
        self.inner.command_record(line)
    }

    fn get_terminal_size(&self) -> (u16, u16) {
        let size = self.inner.get_terminal_size();
        debug!("get_terminal_size() -> {:?}", size);
        size
    }

    fn force_refresh(&mut self) -> Result<(), DisplayError> {
        self.log_op("force_refresh()");
        self.inner.force_refresh()
    }
}

impl Drop for LoggingDisplay {
    fn drop(&mut self) {
        info!("display logging ended ({} operations)", self.op_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_headless::HeadlessDisplay;
    use test_log::test;

    #[test]
    fn test_operations_are_forwarded_and_counted() {
        let mut display = LoggingDisplay::new(Box::new(HeadlessDisplay::new()));
        display.print("hello").unwrap();
        display.split_window(2).unwrap();
        assert!(display.set_font(4).unwrap());
        assert!(!display.set_font(3).unwrap());
        assert_eq!(display.get_terminal_size(), (80, 24));
        assert_eq!(display.op_count(), 4);
    }
}
