//! Human-readable IR dumps

use crate::program::IrProgram;
use crate::value::{HandlerId, ValueId, ValueKind};
use ebb_core::LiteralType;
use std::fmt::Write;

impl IrProgram {
    /// Renders one operand the way it reads in an instruction line.
    fn format_operand(&self, id: ValueId) -> String {
        match self.value(id).kind() {
            ValueKind::ConstInt(value) => value.to_string(),
            ValueKind::ConstBoolean(value) => value.to_string(),
            ValueKind::ConstString(value) => format!("\"{value}\""),
            ValueKind::ConstIp(value) => value.to_string(),
            ValueKind::ConstCidr(value) => value.to_string(),
            ValueKind::ConstRegExp(value) => format!("/{value}/"),
            ValueKind::BuiltinFunction(signature, _) => signature.encode(),
            ValueKind::BuiltinHandler(signature, _) => signature.encode(),
            ValueKind::ConstArray(elements) => {
                let rendered: Vec<String> =
                    elements.iter().map(|&e| self.format_operand(e)).collect();
                format!("[{}]", rendered.join(", "))
            }
            ValueKind::HandlerRef(handler) => format!("@{}", self.handler(*handler).name()),
            ValueKind::Block(_) | ValueKind::Instr(_) => format!("%{}", self.name(id)),
            ValueKind::Removed => "<removed>".to_string(),
        }
    }

    /// `%name = mnemonic operand, operand` (the result name is omitted for
    /// void-typed instructions).
    pub fn format_instr(&self, instr: ValueId) -> String {
        let data = self.instr(instr);
        let mut line = if self.ty(instr) == LiteralType::Void {
            data.op().mnemonic().to_string()
        } else {
            format!("%{} = {}", self.name(instr), data.op().mnemonic())
        };

        for (i, operand) in data.operands().iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            match operand {
                Some(id) => line.push_str(&self.format_operand(*id)),
                None => line.push_str("<none>"),
            }
        }
        line
    }

    pub fn format_block(&self, block: ValueId) -> String {
        let data = self.block(block);
        let mut out = format!("%{}:", self.name(block));

        if !data.predecessors().is_empty() {
            let names: Vec<String> = data
                .predecessors()
                .iter()
                .map(|&p| format!("%{}", self.name(p)))
                .collect();
            let _ = write!(out, " ; [preds: {}]", names.join(", "));
        }
        out.push('\n');

        if !data.successors().is_empty() {
            let names: Vec<String> = data
                .successors()
                .iter()
                .map(|&s| format!("%{}", self.name(s)))
                .collect();
            let _ = writeln!(out, " ; [succs: {}]", names.join(", "));
        }

        for &instr in data.instrs() {
            let _ = writeln!(out, "\t{}", self.format_instr(instr));
        }
        out.push('\n');
        out
    }

    pub fn format_handler(&self, handler: HandlerId) -> String {
        let data = self.handler(handler);
        let entry = data
            .entry_block()
            .map(|b| self.name(b).to_string())
            .unwrap_or_default();
        let mut out = format!(".handler {} ; entryPoint = %{}\n", data.name(), entry);
        for &block in data.blocks() {
            out.push_str(&self.format_block(block));
        }
        out.push('\n');
        out
    }

    /// Renders every handler of the program.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for handler in self.handler_ids() {
            out.push_str(&self.format_handler(handler));
        }
        out
    }
}
