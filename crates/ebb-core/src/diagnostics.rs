//! Structured diagnostics
//!
//! The compilation pipeline appends every diagnostic to a caller-supplied
//! [`Report`] and returns a success flag; it never aborts on its own. Two
//! sinks are provided: [`ConsoleReport`] prints immediately to stderr and
//! counts failures, [`BufferedReport`] collects messages for inspection and
//! comparison (used heavily by tests).

use crate::location::SourceLocation;
use std::fmt;

/// The kind of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    TokenError,
    SyntaxError,
    TypeError,
    Warning,
    LinkError,
}

impl Severity {
    /// Warnings do not fail a compilation; everything else does.
    pub fn is_failure(self) -> bool {
        self != Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::TokenError => "TokenError",
            Severity::SyntaxError => "SyntaxError",
            Severity::TypeError => "TypeError",
            Severity::Warning => "Warning",
            Severity::LinkError => "LinkError",
        };
        f.write_str(name)
    }
}

/// A single diagnostic: severity, source range and rendered text.
#[derive(Debug, Clone, Eq)]
pub struct Message {
    pub severity: Severity,
    pub location: SourceLocation,
    pub text: String,
}

impl Message {
    pub fn new(severity: Severity, location: SourceLocation, text: impl Into<String>) -> Self {
        Self {
            severity,
            location,
            text: text.into(),
        }
    }
}

impl PartialEq for Message {
    // filename and end position are ignored so that reports from different
    // compilations of the same source compare equal
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity
            && self.location.begin == other.location.begin
            && self.text == other.text
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "[{}] {}", self.location, self.text),
            Severity::LinkError => write!(f, "{}: {}", self.severity, self.text),
            _ => write!(f, "[{}] {}: {}", self.location, self.severity, self.text),
        }
    }
}

/// A sink for diagnostics.
pub trait Report {
    fn push(&mut self, message: Message);

    /// True iff any non-warning message has been pushed.
    fn contains_failures(&self) -> bool;

    fn token_error(&mut self, location: SourceLocation, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.push(Message::new(Severity::TokenError, location, text));
    }

    fn syntax_error(&mut self, location: SourceLocation, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.push(Message::new(Severity::SyntaxError, location, text));
    }

    fn type_error(&mut self, location: SourceLocation, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.push(Message::new(Severity::TypeError, location, text));
    }

    fn warning(&mut self, location: SourceLocation, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.push(Message::new(Severity::Warning, location, text));
    }

    /// Link errors carry no source location.
    fn link_error(&mut self, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.push(Message::new(
            Severity::LinkError,
            SourceLocation::default(),
            text,
        ));
    }
}

/// Collects messages in order for later inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedReport {
    messages: Vec<Message>,
}

impl BufferedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.messages.iter().any(|m| m == message)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl Report for BufferedReport {
    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn contains_failures(&self) -> bool {
        self.messages.iter().any(|m| m.severity.is_failure())
    }
}

impl fmt::Display for BufferedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            match message.severity {
                Severity::Warning => writeln!(f, "Warning: {message}")?,
                _ => writeln!(f, "Error: {message}")?,
            }
        }
        Ok(())
    }
}

/// Prints each message to stderr as it arrives and counts failures.
#[derive(Debug, Default)]
pub struct ConsoleReport {
    error_count: usize,
}

impl ConsoleReport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Report for ConsoleReport {
    fn push(&mut self, message: Message) {
        match message.severity {
            Severity::Warning => eprintln!("Warning: {message}"),
            _ => {
                self.error_count += 1;
                eprintln!("Error: {message}");
            }
        }
    }

    fn contains_failures(&self) -> bool {
        self.error_count != 0
    }
}

/// Messages only in the first report, and messages only in the second.
pub fn difference(first: &BufferedReport, second: &BufferedReport) -> (Vec<Message>, Vec<Message>) {
    let only_first = first
        .iter()
        .filter(|m| !second.contains(m))
        .cloned()
        .collect();
    let only_second = second
        .iter()
        .filter(|m| !first.contains(m))
        .cloned()
        .collect();
    (only_first, only_second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FilePos;

    fn at(line: u32) -> SourceLocation {
        SourceLocation::new("test.ebb", FilePos::new(line, 1, 0), FilePos::new(line, 9, 8))
    }

    #[test]
    fn test_contains_failures() {
        let mut report = BufferedReport::new();
        report.warning(at(1), "just a warning");
        assert!(!report.contains_failures());
        report.type_error(at(2), "mismatched types");
        assert!(report.contains_failures());
    }

    #[test]
    fn test_message_equality_ignores_filename_and_end() {
        let a = Message::new(
            Severity::TypeError,
            SourceLocation::new("a.ebb", FilePos::new(3, 1, 10), FilePos::new(3, 4, 13)),
            "boom",
        );
        let b = Message::new(
            Severity::TypeError,
            SourceLocation::new("b.ebb", FilePos::new(3, 1, 10), FilePos::new(9, 9, 99)),
            "boom",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_difference() {
        let mut first = BufferedReport::new();
        first.syntax_error(at(1), "unexpected token");
        first.warning(at(2), "shadowed variable");

        let mut second = BufferedReport::new();
        second.warning(at(2), "shadowed variable");
        second.link_error("unresolved symbol");

        let (only_first, only_second) = difference(&first, &second);
        assert_eq!(only_first.len(), 1);
        assert_eq!(only_first[0].text, "unexpected token");
        assert_eq!(only_second.len(), 1);
        assert_eq!(only_second[0].severity, Severity::LinkError);
    }

    #[test]
    fn test_report_equality() {
        let mut first = BufferedReport::new();
        first.type_error(at(1), "boom");
        let mut second = BufferedReport::new();
        second.type_error(at(1), "boom");
        assert_eq!(first, second);
        second.warning(at(2), "meh");
        assert_ne!(first, second);
    }
}
