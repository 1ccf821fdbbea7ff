//! A pure pretty-printer over a loaded `Program`: walks the code section
//! with the same fetch-decode shape the VM uses, but runs no handlers and
//! touches no VM state, since none exists for disassembly. Long-form
//! operands are resolved against the symbol table where the opcode names
//! one (`GET`/`SET`); everything else is shown as a raw decimal operand.

use std::fmt::Write as _;

use crate::bytecode::program::Program;
use crate::bytecode::{decode, sign_extend_28, Opcode};

fn mnemonic(op: Opcode) -> &'static str {
    match op {
        Opcode::Get => "GET",
        Opcode::Set => "SET",
        Opcode::Fun => "FUN",
        Opcode::Cnst => "CNST",
        Opcode::Cnsh => "CNSH",
        Opcode::Push => "PUSH",
        Opcode::Pop => "POP",
        Opcode::Ret => "RET",
        Opcode::Call => "CALL",
        Opcode::Tcal => "TCAL",
    }
}

/// Renders a `Program` as one line per section header plus one line per
/// instruction in its code segment.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "symbols ({}):", program.symbols.len());
    for (id, name) in program.symbols.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", id, name);
    }

    let _ = writeln!(out, "pc table ({}):", program.pc_table.len());
    for (id, pc) in program.pc_table.iter().enumerate() {
        let _ = writeln!(out, "  [{}] -> {:#06x}", id, pc);
    }

    let _ = writeln!(out, "globals ({}):", program.globals.len());
    for g in &program.globals {
        let name = program.symbols.get(g.sym_id as usize).map(String::as_str).unwrap_or("?");
        let _ = writeln!(out, "  {} (pc_id={}, argc={})", name, g.pc_id, g.arg_count);
    }

    let _ = writeln!(out, "code ({} bytes):", program.code.len());
    let mut pos = 0usize;
    while pos < program.code.len() {
        let (inst, len) = match decode(&program.code, pos) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = writeln!(out, "  {:#06x}: <decode error: {:?}>", pos, e);
                break;
            }
        };
        let line = match inst.opcode {
            Opcode::Get | Opcode::Set => {
                let name = program.symbols.get(inst.operand as usize).map(String::as_str).unwrap_or("?");
                format!("{} {} ; sym {}", mnemonic(inst.opcode), name, inst.operand)
            }
            Opcode::Cnst => format!("{} {}", mnemonic(inst.opcode), sign_extend_28(inst.operand)),
            Opcode::Cnsh => format!("{} {:#x}", mnemonic(inst.opcode), inst.operand),
            _ => mnemonic(inst.opcode).to_string(),
        };
        let _ = writeln!(out, "  {:#06x}: {}", pos, line);
        pos += len;
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::CodeGen;
    use crate::parser::Parser;

    #[test]
    fn disassembles_a_simple_program() {
        let (program_ast, errs) = Parser::parse_program("x=5\n<<<(x)");
        assert_eq!(errs, 0);
        let program = CodeGen::compile_program(&program_ast);
        let text = disassemble(&program);
        assert!(text.contains("CNST 5"));
        assert!(text.contains("SET x ; sym"));
        assert!(text.contains("code ("));
    }
}
