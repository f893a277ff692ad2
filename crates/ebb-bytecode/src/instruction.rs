//! Packed instructions and the disassembler
//!
//! An instruction is a single 64-bit word: the opcode byte followed by three
//! 16-bit operand lanes. Jump targets are absolute program counters within a
//! handler; pool references are indices into the program's constant pool.

use crate::constants::ConstantPool;
use crate::opcode::{stack_change, Opcode, OperandSig};
use std::fmt::Write;

/// One operand lane.
pub type Operand = u16;

/// A handler's code vector.
pub type Code = Vec<Instruction>;

const A_SHIFT: u64 = 8;
const B_SHIFT: u64 = 24;
const C_SHIFT: u64 = 40;

/// A packed instruction word: `[opcode:8][A:16][B:16][C:16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u64);

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self(opcode as u8 as u64)
    }

    pub fn with_a(opcode: Opcode, a: Operand) -> Self {
        Self(opcode as u8 as u64 | (a as u64) << A_SHIFT)
    }

    pub fn with_ab(opcode: Opcode, a: Operand, b: Operand) -> Self {
        Self(opcode as u8 as u64 | (a as u64) << A_SHIFT | (b as u64) << B_SHIFT)
    }

    pub fn with_abc(opcode: Opcode, a: Operand, b: Operand, c: Operand) -> Self {
        Self(
            opcode as u8 as u64
                | (a as u64) << A_SHIFT
                | (b as u64) << B_SHIFT
                | (c as u64) << C_SHIFT,
        )
    }

    pub fn opcode(self) -> Opcode {
        let byte = self.0 as u8;
        match Opcode::from_u8(byte) {
            Some(opcode) => opcode,
            None => panic!("corrupt instruction word: invalid opcode byte {byte:#04x}"),
        }
    }

    pub fn a(self) -> Operand {
        (self.0 >> A_SHIFT) as u16
    }

    pub fn b(self) -> Operand {
        (self.0 >> B_SHIFT) as u16
    }

    pub fn c(self) -> Operand {
        (self.0 >> C_SHIFT) as u16
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }
}

/// Renders a whole code vector, one instruction per line, tracking the
/// simulated stack pointer across instructions.
pub fn disassemble(code: &[Instruction], indent: &str, pool: Option<&ConstantPool>) -> String {
    let mut out = String::new();
    let mut sp: i64 = 0;
    for (ip, &instr) in code.iter().enumerate() {
        out.push_str(indent);
        out.push_str(&disassemble_one(instr, ip, sp.max(0) as usize, pool));
        out.push('\n');
        sp += stack_change(instr);
    }
    out
}

/// Renders a single instruction with decoded operands and an `ip`/`sp`
/// annotation.
pub fn disassemble_one(
    instr: Instruction,
    ip: usize,
    sp: usize,
    pool: Option<&ConstantPool>,
) -> String {
    let opcode = instr.opcode();
    let a = instr.a();
    let mut line = format!("{:<10}", opcode.mnemonic());

    let operands = match pool {
        Some(pool) => match opcode {
            Opcode::ITLoad => Some(format_list(pool.int_array(a as usize).iter())),
            Opcode::STLoad => Some(format_list(
                pool.string_array(a as usize).iter().map(|s| format!("{s:?}")),
            )),
            Opcode::PTLoad => Some(format_list(pool.ipaddr_array(a as usize).iter())),
            Opcode::CTLoad => Some(format_list(pool.cidr_array(a as usize).iter())),
            Opcode::Load => Some(format!("STACK[{a}]")),
            Opcode::Store => Some(format!("@STACK[{a}]")),
            Opcode::NLoad => Some(pool.integer(a as usize).to_string()),
            Opcode::SLoad => Some(format!("{:?}", pool.string(a as usize))),
            Opcode::PLoad => Some(pool.ipaddr(a as usize).to_string()),
            Opcode::CLoad => Some(pool.cidr(a as usize).to_string()),
            Opcode::SRegMatch => Some(format!("/{}/", pool.regexp(a as usize))),
            Opcode::Call => Some(pool.native_function_signatures()[a as usize].clone()),
            Opcode::Handler => Some(pool.native_handler_signatures()[a as usize].clone()),
            _ => None,
        },
        None => None,
    };

    let operands = operands.unwrap_or_else(|| match opcode.operand_sig() {
        OperandSig::V => String::new(),
        OperandSig::I => format!("{a}"),
        OperandSig::II => format!("{}, {}", a, instr.b()),
        OperandSig::III => format!("{}, {}, {}", a, instr.b(), instr.c()),
    });
    line.push_str(&operands);

    while line.len() < 35 {
        line.push(' ');
    }

    let delta = stack_change(instr);
    let sign = if delta > 0 {
        '+'
    } else if delta < 0 {
        '-'
    } else {
        ' '
    };
    let _ = write!(line, "; ip={ip:>3} sp={sp:>2} ({sign}{})", delta.abs());

    line
}

fn format_list<I>(items: I) -> String
where
    I: Iterator,
    I::Item: std::fmt::Display,
{
    let mut out = String::from("[");
    for (i, item) in items.enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{item}");
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing_roundtrip() {
        let instr = Instruction::with_abc(Opcode::Call, 7, 2, 1);
        assert_eq!(instr.opcode(), Opcode::Call);
        assert_eq!(instr.a(), 7);
        assert_eq!(instr.b(), 2);
        assert_eq!(instr.c(), 1);

        let instr = Instruction::with_a(Opcode::ILoad, u16::MAX);
        assert_eq!(instr.a(), u16::MAX);
        assert_eq!(instr.b(), 0);
    }

    #[test]
    fn test_disassemble_one_without_pool() {
        let line = disassemble_one(Instruction::with_a(Opcode::Jmp, 4), 0, 0, None);
        assert!(line.starts_with("JMP"));
        assert!(line.contains('4'));
        assert!(line.contains("ip=  0"));
    }

    #[test]
    fn test_disassemble_tracks_sp() {
        let code = [
            Instruction::with_a(Opcode::ILoad, 1),
            Instruction::with_a(Opcode::ILoad, 2),
            Instruction::new(Opcode::NAdd),
        ];
        let text = disassemble(&code, "", None);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("sp= 0"));
        assert!(lines[1].contains("sp= 1"));
        assert!(lines[2].contains("sp= 2"));
    }
}
