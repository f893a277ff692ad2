//! The host runtime
//!
//! Hosts implement [`Runtime`] to expose their native callables and,
//! optionally, to react to module imports. Programs resolve their
//! unresolved signature tables against a runtime at link time.

use crate::native::{NativeCallback, NativeCallbacks};
use ebb_ir::{IrBuilder, InstrOp, ValueKind};
use std::sync::Arc;

/// A host environment providing native callables to compiled programs.
pub trait Runtime {
    fn callbacks(&self) -> &NativeCallbacks;

    fn callbacks_mut(&mut self) -> &mut NativeCallbacks;

    /// Called once per declared import before linking; returning `false`
    /// fails the link. The default accepts every import unchanged.
    fn import(&mut self, name: &str, path: &str) -> bool {
        let _ = (name, path);
        true
    }

    /// Resolves a canonical signature string to a callback.
    fn find(&self, signature: &str) -> Option<Arc<NativeCallback>> {
        self.callbacks().find(signature)
    }
}

/// Runs every registered verifier over every call site in the program.
///
/// Verifiers may rewrite the IR through the builder. Returns `true` iff no
/// verifier failed; call sites without a registered callback are left for
/// the linker to report.
pub fn verify_native_calls(runtime: &dyn Runtime, builder: &mut IrBuilder) -> bool {
    let mut ok = true;

    for instr in builder.program().all_instrs() {
        // a verifier may have rewritten earlier call sites away
        let Some(data) = builder.program().value(instr).as_instr() else {
            continue;
        };
        if !matches!(data.op(), InstrOp::Call | InstrOp::HandlerCall) {
            continue;
        }
        let callee = data.operand(0);
        let signature = match builder.program().value(callee).kind() {
            ValueKind::BuiltinFunction(signature, _) | ValueKind::BuiltinHandler(signature, _) => {
                signature.encode()
            }
            _ => continue,
        };
        if let Some(callback) = runtime.find(&signature) {
            if !callback.verify(instr, builder) {
                ok = false;
            }
        }
    }

    ok
}
