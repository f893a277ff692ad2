//! Match dispatchers
//!
//! Each match definition of the constant pool is compiled into one of four
//! specialized dispatchers when the program is set up. Evaluation takes the
//! probed string and returns the program counter to continue at, falling
//! back to the definition's else target on a miss.

use crate::trees::{PrefixTree, SuffixTree};
use ebb_bytecode::{ConstantPool, MatchDef};
use ebb_core::{MatchClass, RegExp, RegexpContext};
use rustc_hash::FxHashMap;

/// A compiled match table.
#[derive(Debug)]
pub enum Matcher {
    /// Whole-string equality via hash map
    Same {
        map: FxHashMap<String, u64>,
        else_pc: u64,
    },
    /// Longest-prefix dispatch
    Head {
        tree: PrefixTree<u64>,
        else_pc: u64,
    },
    /// Longest-suffix dispatch
    Tail {
        tree: SuffixTree<u64>,
        else_pc: u64,
    },
    /// First matching regular expression, in case order
    RegExp {
        cases: Vec<(RegExp, u64)>,
        else_pc: u64,
    },
}

impl Matcher {
    /// Builds the dispatcher for one match definition. String labels are
    /// resolved through the string pool, regex labels through the regex
    /// pool.
    pub fn build(def: &MatchDef, pool: &ConstantPool) -> Matcher {
        match def.op {
            MatchClass::Same => {
                let mut map = FxHashMap::default();
                for case in &def.cases {
                    map.insert(pool.string(case.label as usize).to_string(), case.pc);
                }
                Matcher::Same {
                    map,
                    else_pc: def.else_pc,
                }
            }
            MatchClass::Head => {
                let mut tree = PrefixTree::new();
                for case in &def.cases {
                    tree.insert(pool.string(case.label as usize), case.pc);
                }
                Matcher::Head {
                    tree,
                    else_pc: def.else_pc,
                }
            }
            MatchClass::Tail => {
                let mut tree = SuffixTree::new();
                for case in &def.cases {
                    tree.insert(pool.string(case.label as usize), case.pc);
                }
                Matcher::Tail {
                    tree,
                    else_pc: def.else_pc,
                }
            }
            MatchClass::RegExp => {
                let cases = def
                    .cases
                    .iter()
                    .map(|case| (pool.regexp(case.label as usize).clone(), case.pc))
                    .collect();
                Matcher::RegExp {
                    cases,
                    else_pc: def.else_pc,
                }
            }
        }
    }

    /// Returns the program counter for `subject`. A regex dispatcher
    /// stashes the winning case's capture groups into `context`.
    pub fn evaluate(&self, subject: &str, context: &mut RegexpContext) -> u64 {
        match self {
            Matcher::Same { map, else_pc } => map.get(subject).copied().unwrap_or(*else_pc),
            Matcher::Head { tree, else_pc } => tree.lookup(subject).unwrap_or(*else_pc),
            Matcher::Tail { tree, else_pc } => tree.lookup(subject).unwrap_or(*else_pc),
            Matcher::RegExp { cases, else_pc } => cases
                .iter()
                .find(|(re, _)| re.match_with(subject, context))
                .map(|&(_, pc)| pc)
                .unwrap_or(*else_pc),
        }
    }
}
