//! The register-and-stack bytecode VM: a `match`-in-a-loop fetch-decode-
//! dispatch engine over the opcode set of `crate::bytecode`, with a
//! reference-counted environment stack doubling as the call stack.
//!
//! `CALL`/`TCAL` both funnel through `invoke`, which resolves a value-
//! register closure to either a compiled function (push-or-replace a frame
//! and jump) or a native built-in (run it synchronously against the value
//! stack). A native can ask to be treated as a tail-transfer into a further
//! closure rather than returning a value outright — this is how `?`
//! re-enters compiled code without recursing through the Rust call stack,
//! preserving tail-call elimination for conditionals in tail position.
//!
//! Every `CALL`/`TCAL` dispatch pops an argument-count marker the compiler
//! pushes after a call's real arguments, and checks it against the target
//! user closure's declared parameter count (read off its compiled prologue)
//! before binding anything — this is what makes arity mismatches an actual
//! checked error rather than an accident of stack underflow.

use std::fmt;
use std::rc::Rc;

use crate::bytecode::program::{GlobalFunc, Program};
use crate::bytecode::{decode, sign_extend_28, Opcode, OPCODE_BITS};

use super::env::{bind, lookup, new_frame, VmEnv};
use super::ext;
use super::value::{Target, VmValue};

pub use super::ext::NativeFn;

#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub pc: usize,
    pub message: String,
}

impl VmError {
    pub fn new(pc: usize, message: impl Into<String>) -> VmError {
        VmError { pc, message: message.into() }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] (pc={}) {}", self.pc, self.message)
    }
}

/// What a native built-in did: computed a plain value, or asks the VM to
/// tail-transfer control into a further closure (see `?`'s implementation).
pub enum NativeOutcome {
    Value(VmValue),
    TailInto(VmValue),
}

/// A hook consulted before a failed `GET` is reported as "not found".
pub type MissingHook = Box<dyn FnMut(&str) -> Option<VmValue>>;

pub struct Vm {
    symbols: Vec<String>,
    pc_table: Vec<u32>,
    #[allow(dead_code)]
    globals: Vec<GlobalFunc>,
    code: Vec<u8>,
    natives: Vec<NativeFn>,

    pc: usize,
    valreg: VmValue,
    envs: Vec<VmEnv>,
    values: Vec<VmValue>,

    pub error_count: usize,
    pub missing_hook: Option<MissingHook>,
}

impl Vm {
    /// Loads a compiled program: binds every native built-in whose name
    /// appears in the program's symbol table into `ext`, then sets up a
    /// user root frame as `ext`'s child, matching the interpreter's
    /// environment shape.
    pub fn new(program: Program) -> Vm {
        let Program { symbols, pc_table, globals, code } = program;
        let ext = new_frame(None);
        let entries = ext::table();
        let mut natives = Vec::with_capacity(entries.len());
        for (idx, (name, f)) in entries.into_iter().enumerate() {
            if let Some(sym_id) = symbols.iter().position(|s| s == name) {
                bind(&ext, sym_id as u32, VmValue::Closure { target: Target::Native(idx as u32), env: ext.clone() });
            }
            natives.push(f);
        }
        let root = new_frame(Some(ext));
        Vm {
            symbols,
            pc_table,
            globals,
            code,
            natives,
            pc: 0,
            valreg: VmValue::Int(0),
            envs: vec![root],
            values: Vec::new(),
            error_count: 0,
            missing_hook: None,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn pop_value(&mut self) -> Option<VmValue> {
        self.values.pop()
    }

    /// The value register's current contents, e.g. to read a program's
    /// final result after `run` returns.
    pub fn valreg(&self) -> &VmValue {
        &self.valreg
    }

    fn fail(&mut self, message: impl Into<String>) -> VmError {
        let err = VmError::new(self.pc, message);
        eprintln!("{}", err);
        self.error_count += 1;
        err
    }

    fn symbol_name(&self, sym: u32) -> String {
        self.symbols.get(sym as usize).cloned().unwrap_or_default()
    }

    /// Runs from the current `pc` until the root frame returns. Halts and
    /// reports at the first error, matching the interpreter's policy.
    pub fn run(&mut self) -> Result<(), VmError> {
        loop {
            let (inst, len) = match decode(&self.code, self.pc) {
                Ok(pair) => pair,
                Err(e) => return Err(self.fail(format!("{:?}", e))),
            };
            let mut advance = true;

            match inst.opcode {
                Opcode::Get => {
                    let frame = self.envs.last().unwrap().clone();
                    match lookup(&frame, inst.operand) {
                        Some(v) => self.valreg = v,
                        None => {
                            let name = self.symbol_name(inst.operand);
                            let mut hook = self.missing_hook.take();
                            let resolved = hook.as_mut().and_then(|h| h(&name));
                            self.missing_hook = hook;
                            match resolved {
                                Some(v) => self.valreg = v,
                                None => return Err(self.fail(format!("identifier not found: {}", name))),
                            }
                        }
                    }
                }
                Opcode::Set => {
                    let frame = self.envs.last().unwrap().clone();
                    bind(&frame, inst.operand, self.valreg.clone());
                }
                Opcode::Fun => {
                    let pc_id = self.valreg.as_int().unwrap_or(0) as u32;
                    let env = self.envs.last().unwrap().clone();
                    self.valreg = VmValue::Closure { target: Target::User(pc_id), env };
                }
                Opcode::Cnst => {
                    self.valreg = VmValue::Int(sign_extend_28(inst.operand));
                }
                Opcode::Cnsh => {
                    let cur = self.valreg.as_int().unwrap_or(0) as u32;
                    self.valreg = VmValue::Int((cur | (inst.operand << OPCODE_BITS)) as i32);
                }
                Opcode::Push => {
                    self.values.push(self.valreg.clone());
                }
                Opcode::Pop => match self.values.pop() {
                    Some(v) => self.valreg = v,
                    None => return Err(self.fail("pop from empty value stack")),
                },
                Opcode::Ret => {
                    advance = false;
                    if self.envs.len() > 1 {
                        let frame = self.envs.pop().unwrap();
                        self.pc = frame.borrow().ret_pc;
                    } else {
                        return Ok(());
                    }
                }
                Opcode::Call => {
                    advance = false;
                    let value = self.valreg.clone();
                    let ret_pc = self.pc + len;
                    let argc = self.pop_argc()?;
                    self.invoke(value, false, ret_pc, Some(argc))?;
                }
                Opcode::Tcal => {
                    advance = false;
                    let value = self.valreg.clone();
                    let ret_pc = self.envs.last().unwrap().borrow().ret_pc;
                    let argc = self.pop_argc()?;
                    self.invoke(value, true, ret_pc, Some(argc))?;
                }
            }

            if advance {
                self.pc += len;
            }
        }
    }

    /// Pops the argument-count marker the code generator pushes after a
    /// call's real arguments (see `compiler::CodeGen`'s `FunCall` lowering).
    fn pop_argc(&mut self) -> Result<u32, VmError> {
        match self.values.pop() {
            Some(v) => Ok(v.as_int().unwrap_or(0) as u32),
            None => Err(self.fail("missing argument-count marker")),
        }
    }

    /// A user closure's declared parameter count, read directly off its
    /// compiled prologue: `drain_pending` always emits exactly one
    /// `POP; SET param` pair per parameter, consecutively, at the function's
    /// entry pc, so counting them recovers the arity without any separate
    /// per-function table.
    fn declared_arity(&self, entry_pc: u32) -> u32 {
        let mut pos = entry_pc as usize;
        let mut count = 0u32;
        loop {
            let (pop_inst, pop_len) = match decode(&self.code, pos) {
                Ok(pair) => pair,
                Err(_) => break,
            };
            if pop_inst.opcode != Opcode::Pop {
                break;
            }
            let set_pos = pos + pop_len;
            match decode(&self.code, set_pos) {
                Ok((set_inst, set_len)) if set_inst.opcode == Opcode::Set => {
                    pos = set_pos + set_len;
                    count += 1;
                }
                _ => break,
            }
        }
        count
    }

    /// Resolves a value register's closure and either jumps into compiled
    /// code (pushing a frame for `CALL`, replacing the top one for `TCAL`)
    /// or runs a native built-in. A native that answers `TailInto` re-enters
    /// this same method with the original call's tail-ness and return
    /// address, so `?` in tail position costs no extra stack frame; this
    /// internal re-entrance has no argument-count marker of its own (there
    /// is no corresponding CALL/TCAL instruction for it), so it passes
    /// `provided_argc: None` to skip the check.
    fn invoke(
        &mut self,
        value: VmValue,
        is_tail: bool,
        ret_pc: usize,
        provided_argc: Option<u32>,
    ) -> Result<(), VmError> {
        match value {
            VmValue::Int(_) => Err(self.fail("calling a non-function value")),
            VmValue::Closure { target: Target::User(pc_id), env } => {
                let target_pc = match self.pc_table.get(pc_id as usize) {
                    Some(&pc) => pc,
                    None => return Err(self.fail(format!("invalid function pc_id {}", pc_id))),
                };
                if let Some(provided) = provided_argc {
                    let declared = self.declared_arity(target_pc);
                    if provided != declared {
                        return Err(self.fail(format!(
                            "argument count mismatch: expected {}, found {}",
                            declared, provided
                        )));
                    }
                }
                let frame = new_frame(Some(env));
                frame.borrow_mut().ret_pc = ret_pc;
                if is_tail && self.envs.len() > 1 {
                    let top = self.envs.last_mut().unwrap();
                    *top = frame;
                } else {
                    self.envs.push(frame);
                }
                self.pc = target_pc as usize;
                Ok(())
            }
            VmValue::Closure { target: Target::Native(idx), env: _ } => {
                let native = self.natives[idx as usize].clone();
                let outcome = match native.as_ref()(self) {
                    Ok(o) => o,
                    Err(e) => return Err(self.fail(e.message)),
                };
                match outcome {
                    NativeOutcome::Value(v) => {
                        self.valreg = v;
                        if is_tail && self.envs.len() > 1 {
                            self.envs.pop();
                        }
                        self.pc = ret_pc;
                        Ok(())
                    }
                    NativeOutcome::TailInto(branch) => self.invoke(branch, is_tail, ret_pc, None),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::CodeGen;
    use crate::parser::Parser;

    fn run(source: &str) -> Vm {
        let (program, errs) = Parser::parse_program(source);
        assert_eq!(errs, 0, "unexpected parse errors for {:?}", source);
        let bytecode = CodeGen::compile_program(&program);
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        vm
    }

    #[test]
    fn constant_and_print() {
        let vm = run("<<<(42)");
        assert_eq!(vm.valreg.as_int(), Some(42));
    }

    #[test]
    fn closure_capture_by_reference() {
        let vm = run("mk=(x):(): x\nf=mk(7)\n<<<(f())");
        assert_eq!(vm.valreg.as_int(), Some(7));
    }

    #[test]
    fn conditional_tail_call() {
        let vm = run("<<<(?(lt(1,2),(): 10,(): 20))");
        assert_eq!(vm.valreg.as_int(), Some(10));
    }

    #[test]
    fn tail_recursive_factorial() {
        let vm = run("$fact=(n,acc):?(le(n,1),(): acc,(): fact(-(n,1),*(n,acc)))\n<<<(fact(5,1))");
        assert_eq!(vm.valreg.as_int(), Some(120));
    }

    #[test]
    fn undefined_identifier_reports_error() {
        let (program, _) = Parser::parse_program("<<<(nope)");
        let bytecode = CodeGen::compile_program(&program);
        let mut vm = Vm::new(bytecode);
        let result = vm.run();
        assert!(result.is_err());
        assert_eq!(vm.error_count, 1);
    }
}
