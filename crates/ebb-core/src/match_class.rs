//! Match dispatch classes

use std::fmt;

/// The four dispatch disciplines of the string `match` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchClass {
    /// Whole-string equality
    Same,
    /// Longest-prefix match
    Head,
    /// Longest-suffix match
    Tail,
    /// First matching regular expression
    RegExp,
}

impl fmt::Display for MatchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchClass::Same => "Same",
            MatchClass::Head => "Head",
            MatchClass::Tail => "Tail",
            MatchClass::RegExp => "RegExp",
        };
        f.write_str(name)
    }
}
