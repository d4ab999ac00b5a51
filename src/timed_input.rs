//! Run state and the input handoff between the engine and its host
//!
//! A read opcode never blocks. It records what it is waiting for in
//! `RunState::WaitingForInput` and hands control back; the host later
//! answers with `provide_line`/`provide_char`, or calls `fire_timer` when
//! the story asked for a timed interrupt and the interval has elapsed.
//! Wall-clock time is the host's business; the engine only carries the
//! interval and routine.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
    WaitingForInput(InputRequest),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    pub fn input_request(&self) -> Option<&InputRequest> {
        match self {
            RunState::WaitingForInput(request) => Some(request),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Stopped => write!(f, "stopped"),
            RunState::WaitingForInput(request) => write!(f, "waiting for {}", request.mode),
        }
    }
}

/// What a pending read wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub mode: InputMode,
    /// Variable for the terminating or read character (aread v5+, read_char)
    pub store_var: Option<u8>,
    pub timer: Option<TimedInterrupt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Line {
        text_buffer: u32,
        /// 0 when the story does not want the input tokenised
        parse_buffer: u32,
        /// Characters the buffer can take
        max_len: usize,
        /// Characters already in a v5+ buffer before the read
        preloaded: usize,
    },
    Char,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Line { max_len, .. } => write!(f, "a line (max {})", max_len),
            InputMode::Char => write!(f, "a character"),
        }
    }
}

/// Interrupt routine the story wants called every `interval_tenths`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedInterrupt {
    pub interval_tenths: u16,
    /// Packed routine address
    pub routine: u16,
}

impl TimedInterrupt {
    /// Both the interval and the routine must be non-zero for a timer
    pub fn from_operands(interval: Option<u16>, routine: Option<u16>) -> Option<Self> {
        match (interval, routine) {
            (Some(interval_tenths), Some(routine)) if interval_tenths > 0 && routine > 0 => {
                Some(TimedInterrupt {
                    interval_tenths,
                    routine,
                })
            }
            _ => None,
        }
    }
}
