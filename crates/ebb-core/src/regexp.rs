//! Regular-expression literals
//!
//! A thin wrapper around `regex::Regex` that keeps the original pattern for
//! equality, ordering and textual round-trips, plus the per-run capture
//! context the VM exposes through the group-access opcode.

use std::fmt;

/// A compiled regular-expression literal.
#[derive(Debug, Clone)]
pub struct RegExp {
    pattern: String,
    compiled: regex::Regex,
}

impl RegExp {
    /// Compiles a pattern. The pattern text is kept verbatim.
    pub fn new(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let compiled = regex::Regex::new(&pattern)?;
        Ok(Self { pattern, compiled })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tests `subject` without touching any capture context.
    pub fn is_match(&self, subject: &str) -> bool {
        self.compiled.is_match(subject)
    }

    /// Matches `subject`, copying capture groups into `context` on success.
    pub fn match_with(&self, subject: &str, context: &mut RegexpContext) -> bool {
        match self.compiled.captures(subject) {
            Some(caps) => {
                context.groups = caps
                    .iter()
                    .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                true
            }
            None => false,
        }
    }
}

impl PartialEq for RegExp {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for RegExp {}

impl std::hash::Hash for RegExp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

impl PartialOrd for RegExp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegExp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.pattern.cmp(&other.pattern)
    }
}

impl fmt::Display for RegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Capture groups of the most recent successful match in a run.
///
/// Group 0 is the whole match; groups that did not participate read as the
/// empty string.
#[derive(Debug, Clone, Default)]
pub struct RegexpContext {
    groups: Vec<String>,
}

impl RegexpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, index: usize) -> &str {
        self.groups.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_equality() {
        let a = RegExp::new("^a+$").unwrap();
        let b = RegExp::new("^a+$").unwrap();
        let c = RegExp::new("^b+$").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_match_with_captures() {
        let re = RegExp::new(r"^(\w+)@(\w+)$").unwrap();
        let mut ctx = RegexpContext::new();
        assert!(re.match_with("user@host", &mut ctx));
        assert_eq!(ctx.group(0), "user@host");
        assert_eq!(ctx.group(1), "user");
        assert_eq!(ctx.group(2), "host");
        assert_eq!(ctx.group(7), "");
    }

    #[test]
    fn test_failed_match_keeps_context() {
        let re = RegExp::new(r"^(\d+)$").unwrap();
        let mut ctx = RegexpContext::new();
        assert!(re.match_with("42", &mut ctx));
        assert!(!re.match_with("nope", &mut ctx));
        // a failed match leaves the previous groups in place
        assert_eq!(ctx.group(1), "42");
    }
}
