//! Compiled handlers

use ebb_bytecode::{compute_stack_size, disassemble, Code, ConstantPool, Instruction, Opcode};

/// One ready-to-run handler: its name, code and precomputed maximum stack
/// depth. The code vector always ends in `EXIT`; a synthetic `EXIT 0` is
/// appended if the generator left it off.
#[derive(Debug)]
pub struct Handler {
    name: String,
    code: Code,
    stack_size: usize,
}

impl Handler {
    pub fn new(name: impl Into<String>, mut code: Code) -> Self {
        let needs_exit = code
            .last()
            .map(|instr| instr.opcode() != Opcode::Exit)
            .unwrap_or(true);
        if needs_exit {
            code.push(Instruction::with_a(Opcode::Exit, 0));
        }
        let stack_size = compute_stack_size(&code);
        Self {
            name: name.into(),
            code,
            stack_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Maximum stack depth any straight-line execution can reach.
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn disassemble(&self, pool: &ConstantPool) -> String {
        format!(
            ".handler {:<27} ; ({} stack size, {} instructions)\n{}",
            self.name,
            self.stack_size,
            self.code.len(),
            disassemble(&self.code, "  ", Some(pool))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_exit_is_appended() {
        let handler = Handler::new("main", vec![Instruction::with_a(Opcode::ILoad, 7)]);
        assert_eq!(handler.code().len(), 2);
        assert_eq!(handler.code()[1].opcode(), Opcode::Exit);
        assert_eq!(handler.stack_size(), 1);
    }

    #[test]
    fn test_existing_exit_is_kept() {
        let handler = Handler::new("main", vec![Instruction::with_a(Opcode::Exit, 1)]);
        assert_eq!(handler.code().len(), 1);
    }

    #[test]
    fn test_empty_code_gets_exit() {
        let handler = Handler::new("main", Vec::new());
        assert_eq!(handler.code().len(), 1);
        assert_eq!(handler.code()[0].opcode(), Opcode::Exit);
    }
}
