//! Linked programs

use crate::handler::Handler;
use crate::matcher::Matcher;
use crate::native::NativeCallback;
use crate::runtime::Runtime;
use ebb_bytecode::ConstantPool;
use ebb_core::diagnostics::Report;
use std::sync::Arc;

/// A compiled program: the constant pool, its handlers and match
/// dispatchers, and (after [`Program::link`]) the resolved native tables.
///
/// A program is immutable once linked; any number of runners may execute it
/// concurrently.
#[derive(Debug)]
pub struct Program {
    pool: ConstantPool,
    handlers: Vec<Handler>,
    matches: Vec<Matcher>,
    native_handlers: Vec<Arc<NativeCallback>>,
    native_functions: Vec<Arc<NativeCallback>>,
}

impl Program {
    /// Builds the runnable representation from a finished constant pool:
    /// handlers get their synthetic exits and stack sizes, match
    /// definitions get their dispatchers.
    pub fn new(pool: ConstantPool) -> Self {
        let handlers = pool
            .handlers()
            .iter()
            .map(|(name, code)| Handler::new(name.clone(), code.clone()))
            .collect();
        let matches = pool
            .match_defs()
            .iter()
            .map(|def| Matcher::build(def, &pool))
            .collect();
        Self {
            pool,
            handlers,
            matches,
            native_handlers: Vec::new(),
            native_functions: Vec::new(),
        }
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn handler(&self, index: usize) -> &Handler {
        &self.handlers[index]
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn find_handler(&self, name: &str) -> Option<usize> {
        self.handlers.iter().position(|h| h.name() == name)
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(Handler::name).collect()
    }

    pub fn matcher(&self, index: usize) -> &Matcher {
        &self.matches[index]
    }

    /// The resolved native handler at `index`; only valid after a
    /// successful link.
    pub fn native_handler(&self, index: usize) -> &NativeCallback {
        &self.native_handlers[index]
    }

    /// The resolved native function at `index`; only valid after a
    /// successful link.
    pub fn native_function(&self, index: usize) -> &NativeCallback {
        &self.native_functions[index]
    }

    /// Resolves every unresolved native signature against `runtime`,
    /// reporting each miss as a link error. Declared imports are offered to
    /// the runtime first. Returns `true` iff linking succeeded.
    pub fn link<R: Report>(&mut self, runtime: &mut dyn Runtime, report: &mut R) -> bool {
        let mut errors = 0;

        for (name, path) in self.pool.modules().to_vec() {
            if !runtime.import(&name, &path) {
                report.link_error(format!("Failed to import module: {name}"));
                errors += 1;
            }
        }

        self.native_handlers.clear();
        for signature in self.pool.native_handler_signatures() {
            match runtime.find(signature) {
                Some(callback) => self.native_handlers.push(callback),
                None => {
                    report.link_error(format!(
                        "Unresolved symbol to native handler signature: {signature}"
                    ));
                    errors += 1;
                }
            }
        }

        self.native_functions.clear();
        for signature in self.pool.native_function_signatures() {
            match runtime.find(signature) {
                Some(callback) => self.native_functions.push(callback),
                None => {
                    report.link_error(format!(
                        "Unresolved native function signature: {signature}"
                    ));
                    errors += 1;
                }
            }
        }

        errors == 0
    }

    /// Human-readable dump of the constant pool and all handler code.
    pub fn dump(&self) -> String {
        self.pool.disassemble()
    }
}
