//! Crossterm terminal display for the command-line runner
//!
//! The screen is laid out top to bottom as: the v3 status line (once the
//! story has shown one), the upper window, then the scrolling lower window.
//! Upper-window text is placed with absolute cursor moves and kept in a
//! character buffer so it can be redrawn after the lower window scrolls.
//! Input is read in cooked mode by the host, so raw mode is never enabled.

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType, ScrollUp},
};
use log::debug;
use std::io::{self, Stdout, Write};

use crate::display_trait::{DisplayError, ZMachineDisplay};

const STYLE_REVERSE: u16 = 1;
const STYLE_BOLD: u16 = 2;
const STYLE_ITALIC: u16 = 4;

pub struct CrosstermDisplay<W: Write = Stdout> {
    out: W,
    width: u16,
    height: u16,
    /// Set once a v3 status line has been drawn on row 0
    status_line: Option<String>,
    upper_window_lines: u16,
    current_window: u8,
    /// Upper window cursor (0-based, relative to the window)
    upper_row: u16,
    upper_col: u16,
    /// Lower window cursor (0-based screen coordinates)
    lower_row: u16,
    lower_col: u16,
    upper_window_content: Vec<Vec<char>>,
    text_style: u16,
}

impl CrosstermDisplay<Stdout> {
    /// Take over stdout. The terminal's own size wins over the configured
    /// one when it can be read.
    pub fn new(width: u16, height: u16) -> Result<Self, DisplayError> {
        let (width, height) = match terminal::size() {
            Ok((w, h)) if w > 0 && h > 0 => (w, h),
            _ => {
                debug!("terminal size unavailable, using {}x{}", width, height);
                (width, height)
            }
        };
        let mut display = Self::with_writer(io::stdout(), width, height);
        queue!(display.out, Clear(ClearType::All), MoveTo(0, 0))?;
        display.out.flush()?;
        Ok(display)
    }
}

impl<W: Write> CrosstermDisplay<W> {
    /// Draw into any writer; nothing is emitted until the first operation
    pub fn with_writer(out: W, width: u16, height: u16) -> Self {
        Self {
            out,
            width: width.max(1),
            height: height.max(2),
            status_line: None,
            upper_window_lines: 0,
            current_window: 0,
            upper_row: 0,
            upper_col: 0,
            lower_row: 0,
            lower_col: 0,
            upper_window_content: Vec::new(),
            text_style: 0,
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// The upper window row as currently buffered
    pub fn upper_window_line(&self, row: u16) -> Option<String> {
        self.upper_window_content
            .get(row as usize)
            .map(|line| line.iter().collect::<String>().trim_end().to_string())
    }

    fn top(&self) -> u16 {
        u16::from(self.status_line.is_some())
    }

    fn lower_top(&self) -> u16 {
        (self.top() + self.upper_window_lines).min(self.height - 1)
    }

    fn apply_style(&mut self) -> io::Result<()> {
        queue!(self.out, SetAttribute(Attribute::Reset))?;
        if self.text_style & STYLE_REVERSE != 0 {
            queue!(self.out, SetAttribute(Attribute::Reverse))?;
        }
        if self.text_style & STYLE_BOLD != 0 {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if self.text_style & STYLE_ITALIC != 0 {
            queue!(self.out, SetAttribute(Attribute::Italic))?;
        }
        Ok(())
    }

    fn draw_status_line(&mut self) -> io::Result<()> {
        if let Some(status) = &self.status_line {
            queue!(
                self.out,
                MoveTo(0, 0),
                SetAttribute(Attribute::Reverse),
                Print(status.as_str()),
                SetAttribute(Attribute::Reset)
            )?;
            self.apply_style()?;
        }
        Ok(())
    }

    fn redraw_upper_window(&mut self) -> io::Result<()> {
        let top = self.top();
        for row in 0..self.upper_window_lines {
            let line: String = match self.upper_window_content.get(row as usize) {
                Some(line) => line.iter().collect(),
                None => continue,
            };
            queue!(
                self.out,
                MoveTo(0, top + row),
                Clear(ClearType::CurrentLine),
                Print(line.trim_end())
            )?;
        }
        Ok(())
    }

    fn write_lower_run(&mut self, run: &mut String, row: u16, col: u16) -> io::Result<()> {
        if !run.is_empty() {
            queue!(self.out, MoveTo(col, row), Print(run.as_str()))?;
            run.clear();
        }
        Ok(())
    }

    /// Move the lower cursor to the next line, scrolling the whole screen
    /// at the bottom and putting the fixed rows back afterwards
    fn lower_newline(&mut self) -> io::Result<()> {
        self.lower_col = 0;
        if self.lower_row + 1 < self.height {
            self.lower_row += 1;
            return Ok(());
        }
        queue!(self.out, ScrollUp(1))?;
        if self.top() + self.upper_window_lines > 0 {
            self.draw_status_line()?;
            self.redraw_upper_window()?;
        }
        Ok(())
    }

    fn print_lower(&mut self, text: &str) -> io::Result<()> {
        let mut run = String::new();
        let (mut row, mut col) = (self.lower_row, self.lower_col);
        for ch in text.chars() {
            if ch == '\n' {
                self.write_lower_run(&mut run, row, col)?;
                self.lower_newline()?;
                (row, col) = (self.lower_row, self.lower_col);
                continue;
            }
            run.push(ch);
            self.lower_col += 1;
            if self.lower_col >= self.width {
                self.write_lower_run(&mut run, row, col)?;
                self.lower_newline()?;
                (row, col) = (self.lower_row, self.lower_col);
            }
        }
        self.write_lower_run(&mut run, row, col)
    }

    /// Upper window text never wraps or scrolls; it is clipped at the edge
    fn print_upper(&mut self, text: &str) -> io::Result<()> {
        if self.upper_window_lines == 0 {
            debug!("no upper window, dropping {:?}", text);
            return Ok(());
        }
        let top = self.top();
        let mut run = String::new();
        let mut run_col = self.upper_col;
        for ch in text.chars() {
            if ch == '\n' {
                if !run.is_empty() {
                    let row = top + self.upper_row;
                    queue!(self.out, MoveTo(run_col, row), Print(run.as_str()))?;
                    run.clear();
                }
                self.upper_col = 0;
                if self.upper_row + 1 < self.upper_window_lines {
                    self.upper_row += 1;
                }
                run_col = 0;
                continue;
            }
            if self.upper_col >= self.width {
                continue;
            }
            if let Some(line) = self.upper_window_content.get_mut(self.upper_row as usize) {
                if let Some(cell) = line.get_mut(self.upper_col as usize) {
                    *cell = ch;
                }
            }
            run.push(ch);
            self.upper_col += 1;
        }
        if !run.is_empty() {
            let row = top + self.upper_row;
            queue!(self.out, MoveTo(run_col, row), Print(run.as_str()))?;
        }
        Ok(())
    }

    fn clear_rows(&mut self, rows: std::ops::Range<u16>) -> io::Result<()> {
        for row in rows {
            queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        }
        Ok(())
    }
}

impl<W: Write> ZMachineDisplay for CrosstermDisplay<W> {
    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError> {
        let lines = lines.min(self.height - 1 - self.top());
        self.upper_window_lines = lines;
        self.upper_window_content
            .resize(lines as usize, vec![' '; self.width as usize]);
        if self.upper_row >= lines {
            self.upper_row = 0;
            self.upper_col = 0;
        }
        let lower_top = self.lower_top();
        if self.lower_row < lower_top {
            self.lower_row = lower_top;
            self.lower_col = 0;
        }
        debug!("split_window: {} lines, lower window starts at row {}", lines, lower_top);
        Ok(())
    }

    fn set_window(&mut self, window: u8) -> Result<(), DisplayError> {
        // Selecting the upper window homes its cursor
        if window == 1 {
            self.upper_row = 0;
            self.upper_col = 0;
        }
        self.current_window = window;
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError> {
        let col = column.saturating_sub(1).min(self.width - 1);
        if self.current_window == 1 {
            self.upper_row = line
                .saturating_sub(1)
                .min(self.upper_window_lines.saturating_sub(1));
            self.upper_col = col;
        } else {
            let row = self.top() + line.saturating_sub(1);
            self.lower_row = row.clamp(self.lower_top(), self.height - 1);
            self.lower_col = col;
        }
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        if self.current_window == 1 {
            self.print_upper(text)?;
        } else {
            self.print_lower(text)?;
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError> {
        match window {
            -1 | -2 => {
                queue!(self.out, Clear(ClearType::All))?;
                if window == -1 {
                    self.upper_window_lines = 0;
                    self.upper_window_content.clear();
                    self.current_window = 0;
                }
                for line in &mut self.upper_window_content {
                    line.fill(' ');
                }
                self.upper_row = 0;
                self.upper_col = 0;
                self.lower_row = self.lower_top();
                self.lower_col = 0;
                self.draw_status_line()?;
            }
            0 => {
                let lower_top = self.lower_top();
                self.clear_rows(lower_top..self.height)?;
                self.lower_row = lower_top;
                self.lower_col = 0;
            }
            1 => {
                let top = self.top();
                self.clear_rows(top..top + self.upper_window_lines)?;
                for line in &mut self.upper_window_content {
                    line.fill(' ');
                }
                self.upper_row = 0;
                self.upper_col = 0;
            }
            _ => debug!("erase_window({}) ignored", window),
        }
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), DisplayError> {
        if self.current_window == 1 {
            let (row, col) = (self.upper_row, self.upper_col);
            let screen_row = self.top() + row;
            queue!(self.out, MoveTo(col, screen_row), Clear(ClearType::UntilNewLine))?;
            if let Some(line) = self.upper_window_content.get_mut(row as usize) {
                for cell in line.iter_mut().skip(col as usize) {
                    *cell = ' ';
                }
            }
        } else {
            let (row, col) = (self.lower_row, self.lower_col);
            queue!(self.out, MoveTo(col, row), Clear(ClearType::UntilNewLine))?;
        }
        Ok(())
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError> {
        if self.current_window == 1 {
            Ok((self.upper_row + 1, self.upper_col + 1))
        } else {
            Ok((self.lower_row - self.top() + 1, self.lower_col + 1))
        }
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError> {
        self.text_style = style;
        self.apply_style()?;
        Ok(())
    }

    fn show_status(
        &mut self,
        location: &str,
        left: i16,
        right: u16,
        time_game: bool,
    ) -> Result<(), DisplayError> {
        let right_text = if time_game {
            format!("Time: {}:{:02}", left, right)
        } else {
            format!("Score: {}  Moves: {}", left, right)
        };
        let width = self.width as usize;
        let room = width.saturating_sub(right_text.len() + 2);
        let location: String = location.chars().take(room).collect();
        let gap = width.saturating_sub(location.chars().count() + right_text.len() + 2);
        let status = format!(" {}{}{} ", location, " ".repeat(gap), right_text);

        let first = self.status_line.is_none();
        self.status_line = Some(status);
        if first && self.lower_row < self.lower_top() {
            self.lower_row = self.lower_top();
            self.lower_col = 0;
        }
        self.draw_status_line()?;
        Ok(())
    }

    fn get_terminal_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Park the terminal cursor where lower-window input will be echoed
    fn force_refresh(&mut self) -> Result<(), DisplayError> {
        let (row, col) = (self.lower_row, self.lower_col);
        queue!(self.out, MoveTo(col, row))?;
        self.out.flush()?;
        Ok(())
    }

    /// The terminal echoes cooked input itself and the Enter key moves it to
    /// a new line, scrolling at the bottom. Only the cursor bookkeeping and
    /// the fixed rows need to follow.
    fn print_input_echo(&mut self, text: &str) -> Result<(), DisplayError> {
        for ch in text.chars() {
            if ch == '\n' {
                self.lower_col = 0;
                if self.lower_row + 1 < self.height {
                    self.lower_row += 1;
                } else if self.top() + self.upper_window_lines > 0 {
                    self.draw_status_line()?;
                    self.redraw_upper_window()?;
                }
            } else {
                self.lower_col = (self.lower_col + 1).min(self.width - 1);
            }
        }
        Ok(())
    }
}

impl<W: Write> Drop for CrosstermDisplay<W> {
    fn drop(&mut self) {
        let _ = queue!(self.out, SetAttribute(Attribute::Reset));
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn display() -> CrosstermDisplay<Vec<u8>> {
        CrosstermDisplay::with_writer(Vec::new(), 40, 10)
    }

    fn output(display: &CrosstermDisplay<Vec<u8>>) -> String {
        String::from_utf8_lossy(display.writer()).into_owned()
    }

    #[test]
    fn test_upper_window_text_is_placed_at_the_top() {
        let mut d = display();
        d.split_window(1).unwrap();
        d.set_window(1).unwrap();
        d.print("Score: 0").unwrap();
        // crossterm rows and columns are 1-based on the wire
        assert!(output(&d).contains("\x1b[1;1HScore: 0"));
        assert_eq!(d.upper_window_line(0).as_deref(), Some("Score: 0"));
        assert_eq!(d.get_cursor().unwrap(), (1, 9));
    }

    #[test]
    fn test_set_cursor_positions_upper_window_text() {
        let mut d = display();
        d.split_window(3).unwrap();
        d.set_window(1).unwrap();
        d.set_cursor(2, 5).unwrap();
        d.print("quote").unwrap();
        assert!(output(&d).contains("\x1b[2;5Hquote"));
        assert_eq!(d.upper_window_line(1).as_deref(), Some("    quote"));
        // Rows beyond the window are clamped to its last line
        d.set_cursor(9, 1).unwrap();
        assert_eq!(d.get_cursor().unwrap(), (3, 1));
    }

    #[test]
    fn test_lower_window_starts_below_the_split() {
        let mut d = display();
        d.split_window(2).unwrap();
        d.print("You are in a maze.\nOK").unwrap();
        let out = output(&d);
        assert!(out.contains("\x1b[3;1HYou are in a maze."));
        assert!(out.contains("\x1b[4;1HOK"));
        assert_eq!(d.get_cursor().unwrap(), (4, 3));
    }

    #[test]
    fn test_erase_line_and_window_clear_the_buffer() {
        let mut d = display();
        d.split_window(1).unwrap();
        d.set_window(1).unwrap();
        d.print("abcdef").unwrap();
        d.set_cursor(1, 4).unwrap();
        d.erase_line().unwrap();
        assert_eq!(d.upper_window_line(0).as_deref(), Some("abc"));
        assert!(output(&d).contains("\x1b[1;4H\x1b[K"));
        d.erase_window(1).unwrap();
        assert_eq!(d.upper_window_line(0).as_deref(), Some(""));
        d.erase_window(-1).unwrap();
        assert_eq!(d.upper_window_line(0), None);
        assert!(output(&d).contains("\x1b[2J"));
    }

    #[test]
    fn test_text_style_sets_attributes() {
        let mut d = display();
        d.set_text_style(STYLE_REVERSE | STYLE_BOLD).unwrap();
        let out = output(&d);
        assert!(out.contains("\x1b[7m"));
        assert!(out.contains("\x1b[1m"));
    }

    #[test]
    fn test_status_line_pushes_windows_down() {
        let mut d = display();
        d.show_status("West of House", 0, 1, false).unwrap();
        d.print("Hello").unwrap();
        let out = output(&d);
        assert!(out.contains("West of House"));
        assert!(out.contains("Score: 0  Moves: 1"));
        assert!(out.contains("\x1b[2;1HHello"));
        d.show_status("Kitchen", 9, 5, true).unwrap();
        assert!(output(&d).contains("Time: 9:05"));
    }

    #[test]
    fn test_echoed_input_moves_the_lower_cursor_without_printing() {
        let mut d = display();
        d.print(">").unwrap();
        d.force_refresh().unwrap();
        let before = d.writer().len();
        d.print_input_echo("look\n").unwrap();
        assert_eq!(d.writer().len(), before);
        assert_eq!(d.get_cursor().unwrap(), (2, 1));
    }

    #[test]
    fn test_bottom_line_scrolls_and_redraws_upper_window() {
        let mut d = CrosstermDisplay::with_writer(Vec::new(), 20, 4);
        d.split_window(1).unwrap();
        d.set_window(1).unwrap();
        d.print("Top").unwrap();
        d.set_window(0).unwrap();
        d.print("a\nb\nc\nd").unwrap();
        let out = output(&d);
        assert!(out.contains("\x1b[1S"));
        // The upper window is drawn once by print and again after the scroll
        assert_eq!(out.matches("Top").count(), 2);
        assert_eq!(d.get_cursor().unwrap(), (4, 2));
    }
}
