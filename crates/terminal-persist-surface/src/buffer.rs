//! Live terminal buffers held by the surface cache.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A live terminal buffer on the rendering surface.
///
/// Implementations use interior mutability; the cache hands out shared
/// handles and never holds a lock across an await point.
pub trait TerminalBuffer: Send + Sync + fmt::Debug {
    /// Current content as newline-separated text, oldest line first.
    fn content(&self) -> String;

    /// HTML rendering of the content, if the surface supports one.
    fn html(&self) -> Option<String> {
        None
    }

    /// Erase all content.
    fn clear(&self);

    /// Append complete lines.
    fn write_lines(&self, lines: &[String]);
}

#[derive(Debug, Default)]
struct BufferState {
    lines: VecDeque<String>,
    partial: String,
}

/// In-memory scrollback buffer with a line limit.
///
/// Raw output is appended with [`ScrollbackBuffer::append`]; text after the
/// last newline is kept as a partial line until it is terminated.
#[derive(Debug)]
pub struct ScrollbackBuffer {
    state: Mutex<BufferState>,
    max_lines: usize,
}

impl ScrollbackBuffer {
    /// Default scrollback limit.
    pub const DEFAULT_MAX_LINES: usize = 10_000;

    /// Create an empty buffer with the default limit.
    pub fn new() -> Self {
        Self::with_max_lines(Self::DEFAULT_MAX_LINES)
    }

    /// Create an empty buffer keeping at most `max_lines` complete lines.
    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            max_lines,
        }
    }

    /// Append raw output. `\r\n` and `\n` terminate lines.
    pub fn append(&self, text: &str) {
        let mut state = self.lock();
        for ch in text.chars() {
            match ch {
                '\n' => {
                    let line = std::mem::take(&mut state.partial);
                    self.push_line(&mut state, line);
                }
                '\r' => {}
                _ => state.partial.push(ch),
            }
        }
    }

    /// Number of complete lines.
    pub fn line_count(&self) -> usize {
        self.lock().lines.len()
    }

    /// Snapshot of the complete lines.
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    fn push_line(&self, state: &mut BufferState, line: String) {
        state.lines.push_back(line);
        while state.lines.len() > self.max_lines {
            state.lines.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalBuffer for ScrollbackBuffer {
    fn content(&self) -> String {
        let state = self.lock();
        let mut out = state.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if !state.partial.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&state.partial);
        }
        out
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.lines.clear();
        state.partial.clear();
    }

    fn write_lines(&self, lines: &[String]) {
        let mut state = self.lock();
        if !state.partial.is_empty() {
            let partial = std::mem::take(&mut state.partial);
            self.push_line(&mut state, partial);
        }
        for line in lines {
            self.push_line(&mut state, line.clone());
        }
    }
}
