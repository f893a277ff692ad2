//! Handler-scoped transform passes
//!
//! Each pass takes a handler and returns `true` iff it changed it. The
//! [`PassManager`] runs registered passes in registration order; whenever a
//! pass reports a change the handler is re-verified and the whole pipeline
//! restarts, until a full sweep makes no change.

mod empty_blocks;
mod instr_elim;
mod merge_blocks;
mod unused_blocks;

pub use empty_blocks::eliminate_empty_blocks;
pub use instr_elim::{
    eliminate_linear_br, eliminate_unused_instr, fold_constant_cond_br, rewrite_br_to_exit,
    rewrite_cond_br_to_same_branches,
};
pub use merge_blocks::merge_same_blocks;
pub use unused_blocks::eliminate_unused_blocks;

use crate::program::IrProgram;
use crate::value::HandlerId;

/// A handler transform; returns `true` iff it changed the handler.
pub type HandlerPass = Box<dyn Fn(&mut IrProgram, HandlerId) -> bool>;

/// Runs registered passes to a fixed point, verifying after every change.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<(String, HandlerPass)>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard optimization pipeline.
    pub fn with_default_passes() -> Self {
        let mut pm = Self::new();
        pm.register_pass("eliminate-empty-blocks", eliminate_empty_blocks);
        pm.register_pass("eliminate-linear-br", eliminate_linear_br);
        pm.register_pass("eliminate-unused-blocks", eliminate_unused_blocks);
        pm.register_pass("eliminate-unused-instr", eliminate_unused_instr);
        pm.register_pass("fold-constant-condbr", fold_constant_cond_br);
        pm.register_pass("rewrite-br-to-exit", rewrite_br_to_exit);
        pm.register_pass(
            "rewrite-cond-br-to-same-branches",
            rewrite_cond_br_to_same_branches,
        );
        pm.register_pass("merge-same-blocks", merge_same_blocks);
        pm
    }

    pub fn register_pass(
        &mut self,
        name: impl Into<String>,
        pass: impl Fn(&mut IrProgram, HandlerId) -> bool + 'static,
    ) {
        self.passes.push((name.into(), Box::new(pass)));
    }

    /// Optimizes every handler of the program.
    pub fn run(&self, program: &mut IrProgram) {
        for handler in program.handler_ids().collect::<Vec<_>>() {
            self.log_debug(|| format!("optimizing handler {}", program.handler(handler).name()));
            self.run_handler(program, handler);
        }
    }

    /// Optimizes one handler to a fixed point.
    pub fn run_handler(&self, program: &mut IrProgram, handler: HandlerId) {
        loop {
            let mut changes = 0;
            for (name, pass) in &self.passes {
                if pass(program, handler) {
                    self.log_debug(|| format!("pass {name}: changes detected"));
                    program.verify_handler(handler);
                    changes += 1;
                }
            }
            self.log_debug(|| format!("{changes} changes detected"));
            if changes == 0 {
                break;
            }
        }
    }

    fn log_debug(&self, message: impl Fn() -> String) {
        if std::env::var("EBB_DEBUG_TRANSFORMS").as_deref() == Ok("1") {
            eprintln!("PassManager: {}", message());
        }
    }
}
