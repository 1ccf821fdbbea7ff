//! The code generator: walks an `Ast`, emitting bytecode into a byte buffer
//! while interning symbols, resolving forward function labels through a
//! two-phase (unresolved/resolved) pc-id table, and applying the smart-get
//! and CALL→TCAL peephole optimizations described alongside the instruction
//! set. Function bodies are not compiled inline where their `Func` literal
//! appears; compiling one only reserves a label and enqueues its body,
//! which is drained to a fixpoint once the top-level statements are done.

use std::collections::{HashMap, VecDeque};

use crate::ast::Ast;
use crate::bytecode::program::{GlobalFunc, Program};
use crate::bytecode::{Opcode, OPCODE_BITS, OPERAND_BITS, OPERAND_MASK};

struct PendingFunc {
    label: String,
    name: Option<String>,
    params: Vec<String>,
    body: Ast,
}

pub struct CodeGen {
    symbols: Vec<String>,
    pc_table: Vec<u32>,
    globals: Vec<GlobalFunc>,
    code: Vec<u8>,

    resolved: HashMap<String, u32>,
    unresolved: HashMap<String, u32>,
    pending: VecDeque<PendingFunc>,
    label_counter: usize,

    last_op: Option<Opcode>,
    last_op_offset: usize,
    last_set_symbol: Option<u32>,
}

impl CodeGen {
    pub fn new() -> CodeGen {
        CodeGen {
            symbols: Vec::new(),
            pc_table: Vec::new(),
            globals: Vec::new(),
            code: Vec::new(),
            resolved: HashMap::new(),
            unresolved: HashMap::new(),
            pending: VecDeque::new(),
            label_counter: 0,
            last_op: None,
            last_op_offset: 0,
            last_set_symbol: None,
        }
    }

    /// Compiles a whole program: lowers every top-level statement, emits
    /// the terminating root `RET`, then drains the pending function queue
    /// to a fixpoint, and returns the finished bytecode `Program`.
    pub fn compile_program(program: &[Ast]) -> Program {
        let mut gen = CodeGen::new();
        for stmt in program {
            gen.compile_ast(stmt);
        }
        gen.ret();
        gen.drain_pending();
        debug_assert!(gen.unresolved.is_empty(), "unresolved function label at end of codegen");
        Program {
            symbols: gen.symbols,
            pc_table: gen.pc_table,
            globals: gen.globals,
            code: gen.code,
        }
    }

    fn drain_pending(&mut self) {
        while let Some(func) = self.pending.pop_front() {
            self.label(&func.label);
            for param in func.params.iter().rev() {
                self.pop();
                self.set(param);
            }
            self.compile_ast(&func.body);
            self.gen_return();
            if let Some(name) = &func.name {
                if Ast::is_global_name(name) {
                    self.register_global_function(name, &func.label, func.params.len() as u8);
                }
            }
        }
    }

    fn compile_ast(&mut self, ast: &Ast) {
        match ast {
            Ast::Id(name) => self.smart_get(name),
            Ast::Num(n) => self.emit_const(*n),
            Ast::Define(name, expr) => {
                self.compile_ast(expr);
                if matches!(expr.as_ref(), Ast::Func(..)) {
                    if let Some(last) = self.pending.back_mut() {
                        last.name = Some(name.clone());
                    }
                }
                self.set(name);
            }
            Ast::Func(params, body) => {
                let label = self.next_label();
                let pc_id = self.get_func_id(&label);
                self.pending.push_back(PendingFunc {
                    label,
                    name: None,
                    params: params.clone(),
                    body: (**body).clone(),
                });
                self.emit_const(pc_id as i32);
                self.fun();
            }
            Ast::FunCall(callee, args) => {
                for arg in args {
                    self.compile_ast(arg);
                    self.push();
                }
                self.emit_const(args.len() as i32);
                self.push();
                self.compile_ast(callee);
                self.call();
            }
        }
    }

    // --- symbol / label bookkeeping -------------------------------------

    fn get_symbol_index(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.symbols.iter().position(|s| s == name) {
            return pos as u32;
        }
        self.symbols.push(name.to_string());
        (self.symbols.len() - 1) as u32
    }

    fn next_label(&mut self) -> String {
        let id = self.label_counter;
        self.label_counter += 1;
        format!(":func-{}", id)
    }

    fn get_func_id(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.resolved.get(label) {
            return id;
        }
        if let Some(&id) = self.unresolved.get(label) {
            return id;
        }
        let pc_id = self.pc_table.len() as u32;
        self.pc_table.push(0);
        self.unresolved.insert(label.to_string(), pc_id);
        pc_id
    }

    /// Backfills an unresolved label's reserved pc-table slot, or appends a
    /// fresh one if this label was never referenced before being defined.
    fn label(&mut self, label: &str) {
        debug_assert!(!self.resolved.contains_key(label), "label defined twice: {}", label);
        if let Some(pc_id) = self.unresolved.remove(label) {
            self.pc_table[pc_id as usize] = self.code.len() as u32;
            self.resolved.insert(label.to_string(), pc_id);
        } else {
            let pc_id = self.pc_table.len() as u32;
            self.pc_table.push(self.code.len() as u32);
            self.resolved.insert(label.to_string(), pc_id);
        }
    }

    fn register_global_function(&mut self, name: &str, label: &str, arg_count: u8) {
        let sym_id = self.get_symbol_index(name);
        let pc_id = self.get_func_id(label);
        self.globals.push(GlobalFunc { sym_id, pc_id, arg_count });
    }

    // --- instruction emission --------------------------------------------

    fn push_short(&mut self, op: Opcode) {
        let offset = self.code.len();
        crate::bytecode::encode(&mut self.code, op, 0);
        self.last_op = Some(op);
        self.last_op_offset = offset;
    }

    fn push_long(&mut self, op: Opcode, operand: u32) {
        let offset = self.code.len();
        crate::bytecode::encode(&mut self.code, op, operand);
        self.last_op = Some(op);
        self.last_op_offset = offset;
    }

    fn get(&mut self, name: &str) {
        let idx = self.get_symbol_index(name);
        self.push_long(Opcode::Get, idx);
    }

    fn set(&mut self, name: &str) {
        let idx = self.get_symbol_index(name);
        self.push_long(Opcode::Set, idx);
        self.last_set_symbol = Some(idx);
    }

    fn fun(&mut self) {
        self.push_short(Opcode::Fun);
    }

    fn cnst_raw(&mut self, operand: u32) {
        self.push_long(Opcode::Cnst, operand);
    }

    fn cnsh_raw(&mut self, operand: u32) {
        self.push_long(Opcode::Cnsh, operand);
    }

    fn push(&mut self) {
        self.push_short(Opcode::Push);
    }

    fn pop(&mut self) {
        self.push_short(Opcode::Pop);
    }

    fn ret(&mut self) {
        self.push_short(Opcode::Ret);
    }

    fn call(&mut self) {
        self.push_short(Opcode::Call);
    }

    // --- peepholes -----------------------------------------------------

    /// Suppresses a `GET` if the immediately preceding instruction was a
    /// `SET` of the same symbol: the value is still sitting in the value
    /// register.
    fn smart_get(&mut self, name: &str) {
        if self.last_op == Some(Opcode::Set) {
            let idx = self.get_symbol_index(name);
            if self.last_set_symbol == Some(idx) {
                return;
            }
        }
        self.get(name);
    }

    /// Rewrites a trailing `CALL` into `TCAL` in place; otherwise emits a
    /// plain `RET`. Both opcodes are short-form, so the rewrite is a single
    /// in-place byte write.
    fn gen_return(&mut self) {
        if self.last_op == Some(Opcode::Call) {
            self.code[self.last_op_offset] = Opcode::Tcal as u8;
            self.last_op = Some(Opcode::Tcal);
        } else {
            self.ret();
        }
    }

    /// `Num(k)`'s lowering: `CNST (k & 0x0FFFFFFF)`, followed by `CNSH`
    /// only when the upper 4 bits don't already match what `CNST`'s sign
    /// extension would produce.
    fn emit_const(&mut self, num: i32) {
        let num_u = num as u32;
        self.cnst_raw(num_u & OPERAND_MASK);
        let hi = num_u & !OPERAND_MASK;
        let sign_bit = (num_u >> (OPERAND_BITS - 1)) & 1;
        let implied_hi = if sign_bit == 1 { !OPERAND_MASK } else { 0 };
        if hi != implied_hi {
            self.cnsh_raw(hi >> OPCODE_BITS);
        }
    }
}

impl Default for CodeGen {
    fn default() -> CodeGen {
        CodeGen::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::decode;
    use crate::parser::Parser;

    fn compile(source: &str) -> Program {
        let (program, errs) = Parser::parse_program(source);
        assert_eq!(errs, 0);
        CodeGen::compile_program(&program)
    }

    #[test]
    fn smart_get_suppresses_redundant_get() {
        let program = compile("x=1\n<<<(x)");
        let mut pos = 0;
        let mut saw_set_then_get = false;
        let mut last_was_matching_set = false;
        let x_id = program.symbols.iter().position(|s| s == "x").unwrap() as u32;
        while pos < program.code.len() {
            let (inst, len) = decode(&program.code, pos).unwrap();
            if last_was_matching_set && inst.opcode == Opcode::Get && inst.operand == x_id {
                saw_set_then_get = true;
            }
            last_was_matching_set = inst.opcode == Opcode::Set && inst.operand == x_id;
            pos += len;
        }
        assert!(!saw_set_then_get, "smart-get peephole should have suppressed this GET");
    }

    #[test]
    fn call_to_tcal_peephole_on_tail_position() {
        let program = compile("$fact=(n,acc):?(le(n,1),(): acc,(): fact(n,acc))\n<<<(fact(1,1))");
        let mut pos = 0;
        let mut saw_tcal = false;
        while pos < program.code.len() {
            let (inst, len) = decode(&program.code, pos).unwrap();
            if inst.opcode == Opcode::Tcal {
                saw_tcal = true;
            }
            pos += len;
        }
        assert!(saw_tcal, "expected at least one CALL to be converted to TCAL");
    }

    #[test]
    fn global_function_is_registered() {
        let program = compile("$fact=(n):n\n<<<(fact(1))");
        assert_eq!(program.globals.len(), 1);
        let name = &program.symbols[program.globals[0].sym_id as usize];
        assert_eq!(name, "$fact");
        assert_eq!(program.globals[0].arg_count, 1);
    }

    #[test]
    fn const_suppresses_cnsh_for_small_values() {
        let program = compile("x=5");
        let (inst, len) = decode(&program.code, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Cnst);
        let (next, _) = decode(&program.code, len).unwrap();
        assert_eq!(next.opcode, Opcode::Set);
    }
}
