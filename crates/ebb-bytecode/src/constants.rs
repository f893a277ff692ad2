//! Runtime constant pool
//!
//! A deduplicated table per literal kind, built up during code generation and
//! indexed directly by the bytecode at runtime. The pool also owns the
//! handler table (name + code), the match-definition table, the import list,
//! and the two signature tables of not-yet-resolved native callables that the
//! linker fills in.

use crate::instruction::{disassemble, Code};
use crate::opcode::compute_stack_size;
use ebb_core::{Cidr, MatchClass, RegExp};
use std::fmt::Write;
use std::net::IpAddr;

/// One case of a match definition: a label (string- or regex-pool index) and
/// the program counter of its target block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCaseDef {
    pub label: u64,
    pub pc: u64,
}

impl MatchCaseDef {
    pub fn new(label: u64) -> Self {
        Self { label, pc: 0 }
    }
}

/// A match table: the owning handler, the dispatch class, the else target and
/// the case list. The program counters are back-patched by the code
/// generator once block addresses are final.
#[derive(Debug, Clone)]
pub struct MatchDef {
    pub handler_id: usize,
    pub op: MatchClass,
    pub else_pc: u64,
    pub cases: Vec<MatchCaseDef>,
}

impl Default for MatchDef {
    fn default() -> Self {
        Self {
            handler_id: 0,
            op: MatchClass::Same,
            else_pc: 0,
            cases: Vec::new(),
        }
    }
}

fn intern<T: PartialEq>(table: &mut Vec<T>, value: T) -> usize {
    if let Some(index) = table.iter().position(|v| *v == value) {
        return index;
    }
    table.push(value);
    table.len() - 1
}

/// The deduplicated constant tables of one compiled program.
#[derive(Debug, Default)]
pub struct ConstantPool {
    // constant primitives
    numbers: Vec<i64>,
    strings: Vec<String>,
    ipaddrs: Vec<IpAddr>,
    cidrs: Vec<Cidr>,
    regexps: Vec<RegExp>,

    // constant arrays
    int_arrays: Vec<Vec<i64>>,
    string_arrays: Vec<Vec<String>>,
    ipaddr_arrays: Vec<Vec<IpAddr>>,
    cidr_arrays: Vec<Vec<Cidr>>,

    // code data
    modules: Vec<(String, String)>,
    handlers: Vec<(String, Code)>,
    match_defs: Vec<MatchDef>,
    native_handler_signatures: Vec<String>,
    native_function_signatures: Vec<String>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- builders -----

    pub fn make_integer(&mut self, value: i64) -> usize {
        intern(&mut self.numbers, value)
    }

    pub fn make_string(&mut self, value: &str) -> usize {
        if let Some(index) = self.strings.iter().position(|v| v == value) {
            return index;
        }
        self.strings.push(value.to_string());
        self.strings.len() - 1
    }

    pub fn make_ipaddr(&mut self, value: IpAddr) -> usize {
        intern(&mut self.ipaddrs, value)
    }

    pub fn make_cidr(&mut self, value: Cidr) -> usize {
        intern(&mut self.cidrs, value)
    }

    pub fn make_regexp(&mut self, value: RegExp) -> usize {
        intern(&mut self.regexps, value)
    }

    pub fn make_int_array(&mut self, elements: Vec<i64>) -> usize {
        intern(&mut self.int_arrays, elements)
    }

    pub fn make_string_array(&mut self, elements: Vec<String>) -> usize {
        intern(&mut self.string_arrays, elements)
    }

    pub fn make_ipaddr_array(&mut self, elements: Vec<IpAddr>) -> usize {
        intern(&mut self.ipaddr_arrays, elements)
    }

    pub fn make_cidr_array(&mut self, elements: Vec<Cidr>) -> usize {
        intern(&mut self.cidr_arrays, elements)
    }

    /// Reserves a fresh match definition; fields are filled in afterwards
    /// through [`ConstantPool::match_def_mut`].
    pub fn make_match_def(&mut self) -> usize {
        self.match_defs.push(MatchDef::default());
        self.match_defs.len() - 1
    }

    pub fn make_native_handler(&mut self, signature: &str) -> usize {
        if let Some(index) = self
            .native_handler_signatures
            .iter()
            .position(|v| v == signature)
        {
            return index;
        }
        self.native_handler_signatures.push(signature.to_string());
        self.native_handler_signatures.len() - 1
    }

    pub fn make_native_function(&mut self, signature: &str) -> usize {
        if let Some(index) = self
            .native_function_signatures
            .iter()
            .position(|v| v == signature)
        {
            return index;
        }
        self.native_function_signatures.push(signature.to_string());
        self.native_function_signatures.len() - 1
    }

    /// Returns the slot of the handler with the given name, creating an
    /// empty slot on first reference.
    pub fn make_handler(&mut self, name: &str) -> usize {
        if let Some(index) = self.handlers.iter().position(|(n, _)| n == name) {
            return index;
        }
        self.handlers.push((name.to_string(), Code::new()));
        self.handlers.len() - 1
    }

    /// Creates (or finds) the named handler slot and installs its code.
    pub fn set_handler(&mut self, name: &str, code: Code) -> usize {
        let id = self.make_handler(name);
        self.handlers[id].1 = code;
        id
    }

    /// Installs the code of an already-reserved handler slot.
    pub fn set_handler_code(&mut self, id: usize, code: Code) {
        self.handlers[id].1 = code;
    }

    pub fn set_modules(&mut self, modules: Vec<(String, String)>) {
        self.modules = modules;
    }

    // ----- accessors -----

    pub fn integer(&self, id: usize) -> i64 {
        self.numbers[id]
    }

    pub fn string(&self, id: usize) -> &str {
        &self.strings[id]
    }

    pub fn ipaddr(&self, id: usize) -> &IpAddr {
        &self.ipaddrs[id]
    }

    pub fn cidr(&self, id: usize) -> &Cidr {
        &self.cidrs[id]
    }

    pub fn regexp(&self, id: usize) -> &RegExp {
        &self.regexps[id]
    }

    pub fn int_array(&self, id: usize) -> &[i64] {
        &self.int_arrays[id]
    }

    pub fn string_array(&self, id: usize) -> &[String] {
        &self.string_arrays[id]
    }

    pub fn ipaddr_array(&self, id: usize) -> &[IpAddr] {
        &self.ipaddr_arrays[id]
    }

    pub fn cidr_array(&self, id: usize) -> &[Cidr] {
        &self.cidr_arrays[id]
    }

    pub fn match_def(&self, id: usize) -> &MatchDef {
        &self.match_defs[id]
    }

    pub fn match_def_mut(&mut self, id: usize) -> &mut MatchDef {
        &mut self.match_defs[id]
    }

    pub fn handler(&self, id: usize) -> &(String, Code) {
        &self.handlers[id]
    }

    // ----- bulk accessors -----

    pub fn modules(&self) -> &[(String, String)] {
        &self.modules
    }

    pub fn handlers(&self) -> &[(String, Code)] {
        &self.handlers
    }

    pub fn match_defs(&self) -> &[MatchDef] {
        &self.match_defs
    }

    pub fn native_handler_signatures(&self) -> &[String] {
        &self.native_handler_signatures
    }

    pub fn native_function_signatures(&self) -> &[String] {
        &self.native_function_signatures
    }

    /// Renders the whole pool plus every handler's code.
    pub fn disassemble(&self) -> String {
        let mut out = String::from("; Program\n");

        if !self.modules.is_empty() {
            out.push_str("\n; Modules\n");
            for (name, path) in &self.modules {
                if path.is_empty() {
                    let _ = writeln!(out, ".module '{name}'");
                } else {
                    let _ = writeln!(out, ".module '{name}' from '{path}'");
                }
            }
        }

        if !self.native_function_signatures.is_empty() {
            out.push_str("\n; External Functions\n");
            for (i, sig) in self.native_function_signatures.iter().enumerate() {
                let _ = writeln!(out, ".extern function {i:>3} = {sig}");
            }
        }

        if !self.native_handler_signatures.is_empty() {
            out.push_str("\n; External Handlers\n");
            for (i, sig) in self.native_handler_signatures.iter().enumerate() {
                let _ = writeln!(out, ".extern handler {i:>4} = {sig}");
            }
        }

        if !self.numbers.is_empty() {
            out.push_str("\n; Integer Constants\n");
            for (i, value) in self.numbers.iter().enumerate() {
                let _ = writeln!(out, ".const integer {i:>5} = {value}");
            }
        }

        if !self.strings.is_empty() {
            out.push_str("\n; String Constants\n");
            for (i, value) in self.strings.iter().enumerate() {
                let _ = writeln!(out, ".const string {i:>6} = '{value}'");
            }
        }

        if !self.ipaddrs.is_empty() {
            out.push_str("\n; IP Constants\n");
            for (i, value) in self.ipaddrs.iter().enumerate() {
                let _ = writeln!(out, ".const ipaddr {i:>6} = {value}");
            }
        }

        if !self.cidrs.is_empty() {
            out.push_str("\n; CIDR Constants\n");
            for (i, value) in self.cidrs.iter().enumerate() {
                let _ = writeln!(out, ".const cidr {i:>8} = {value}");
            }
        }

        if !self.regexps.is_empty() {
            out.push_str("\n; Regular Expression Constants\n");
            for (i, value) in self.regexps.iter().enumerate() {
                let _ = writeln!(out, ".const regex {i:>7} = /{value}/");
            }
        }

        self.dump_arrays(&mut out, &self.int_arrays, "Integer", |v| v.to_string());
        self.dump_arrays(&mut out, &self.string_arrays, "String", |v| {
            format!("\"{v}\"")
        });
        self.dump_arrays(&mut out, &self.ipaddr_arrays, "IPAddress", |v| {
            v.to_string()
        });
        self.dump_arrays(&mut out, &self.cidr_arrays, "Cidr", |v| v.to_string());

        if !self.match_defs.is_empty() {
            out.push_str("\n; Match Table\n");
            for (i, def) in self.match_defs.iter().enumerate() {
                let _ = writeln!(
                    out,
                    ".const match {i:>7} = handler {}, op {}, elsePC {} ; {}",
                    def.handler_id, def.op, def.else_pc, self.handlers[def.handler_id].0
                );
                for (k, case) in def.cases.iter().enumerate() {
                    let label = if def.op == MatchClass::RegExp {
                        format!("/{}/", self.regexps[case.label as usize])
                    } else {
                        format!("'{}'", self.strings[case.label as usize])
                    };
                    let _ = writeln!(
                        out,
                        "                       case {k:>3} = label {:>2}, pc {:>4} ; {label}",
                        case.label, case.pc
                    );
                }
            }
        }

        for (name, code) in &self.handlers {
            let _ = writeln!(
                out,
                "\n.handler {name:<27} ; ({} stack size, {} instructions)",
                compute_stack_size(code),
                code.len()
            );
            out.push_str(&disassemble(code, "  ", Some(self)));
        }

        out.push('\n');
        out
    }

    fn dump_arrays<T>(
        &self,
        out: &mut String,
        arrays: &[Vec<T>],
        name: &str,
        render: impl Fn(&T) -> String,
    ) {
        if arrays.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n; Constant {name} Arrays");
        for (i, array) in arrays.iter().enumerate() {
            let elems: Vec<String> = array.iter().map(&render).collect();
            let _ = writeln!(
                out,
                ".const array<{name}> {i:>3} = [{}];",
                elems.join(", ")
            );
        }
    }
}
