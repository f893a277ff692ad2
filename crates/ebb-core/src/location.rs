//! Source locations
//!
//! Positions and ranges inside a source file, used by diagnostics. The core
//! never opens source files itself; locations are carried through from the
//! frontend verbatim.

use std::fmt;

/// A position in a source file: 1-based line and column plus a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePos {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl FilePos {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Advances past one character of input.
    pub fn advance(&mut self, ch: char) {
        self.offset += ch.len_utf8() as u32;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for FilePos {
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for FilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range in a named source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub filename: String,
    pub begin: FilePos,
    pub end: FilePos,
}

impl SourceLocation {
    pub fn new(filename: impl Into<String>, begin: FilePos, end: FilePos) -> Self {
        Self {
            filename: filename.into(),
            begin,
            end,
        }
    }

    /// Extends this range to cover up to `end`.
    pub fn update(&mut self, end: &SourceLocation) {
        self.end = end.end;
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ {}.{} - {}.{} }}",
            self.begin, self.begin.offset, self.end, self.end.offset
        )
    }
}
