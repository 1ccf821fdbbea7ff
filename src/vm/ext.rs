//! The VM's 24 native built-ins. Each is a closure over `Vm`'s value stack,
//! popping its arguments (rightmost pushed, rightmost popped first) and
//! either returning a plain computed value or, for `?`, asking the VM to
//! tail-transfer into one of its closure arguments rather than computing a
//! value itself — the mid-dispatch re-entrance described alongside the
//! opcode handlers.

use std::io::{self, Write};
use std::rc::Rc;

use crate::core_ops::{apply_binary, apply_unary, Operator};

use super::machine::{NativeOutcome, Vm, VmError};
use super::value::VmValue;

pub type NativeFn = Rc<dyn Fn(&mut Vm) -> Result<NativeOutcome, VmError>>;

fn pop(vm: &mut Vm) -> Result<VmValue, VmError> {
    vm.pop_value().ok_or_else(|| VmError::new(vm.pc(), "pop from empty value stack"))
}

fn pop_int(vm: &mut Vm) -> Result<i32, VmError> {
    let v = pop(vm)?;
    v.as_int().ok_or_else(|| VmError::new(vm.pc(), "expected an integer argument"))
}

fn binop(op: Operator) -> NativeFn {
    Rc::new(move |vm: &mut Vm| {
        let r = pop_int(vm)?;
        let l = pop_int(vm)?;
        let v = apply_binary(op, l, r).map_err(|e| VmError::new(vm.pc(), e.to_string()))?;
        Ok(NativeOutcome::Value(VmValue::Int(v)))
    })
}

fn unop(op: Operator) -> NativeFn {
    Rc::new(move |vm: &mut Vm| {
        let l = pop_int(vm)?;
        Ok(NativeOutcome::Value(VmValue::Int(apply_unary(op, l))))
    })
}

/// Returns the ordered `(name, implementation)` table; callers bind each
/// entry into `ext` at whatever symbol id the loaded program assigned its
/// name, if any.
pub fn table() -> Vec<(&'static str, NativeFn)> {
    vec![
        ("<<<", Rc::new(|vm: &mut Vm| {
            let v = pop(vm)?;
            println!("{}", v);
            io::stdout().flush().ok();
            Ok(NativeOutcome::Value(v))
        })),
        (">>>", Rc::new(|vm: &mut Vm| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map_err(|e| VmError::new(vm.pc(), format!("read error: {}", e)))?;
            let n = line.trim().parse::<i32>().map_err(|_| VmError::new(vm.pc(), "expected a decimal integer on stdin"))?;
            Ok(NativeOutcome::Value(VmValue::Int(n)))
        })),
        ("?", Rc::new(|vm: &mut Vm| {
            let else_branch = pop(vm)?;
            let then_branch = pop(vm)?;
            let cond = pop_int(vm)?;
            let chosen = if cond != 0 { then_branch } else { else_branch };
            if !chosen.is_closure() {
                return Err(VmError::new(vm.pc(), "branch of '?' is not a function"));
            }
            Ok(NativeOutcome::TailInto(chosen))
        })),
        ("is", Rc::new(|vm: &mut Vm| {
            let r = pop(vm)?;
            let l = pop(vm)?;
            Ok(NativeOutcome::Value(VmValue::Int(if l == r { 1 } else { 0 })))
        })),
        ("eq", binop(Operator::Eq)),
        ("neq", binop(Operator::Neq)),
        ("lt", binop(Operator::Lt)),
        ("le", binop(Operator::Le)),
        ("gt", binop(Operator::Gt)),
        ("ge", binop(Operator::Ge)),
        ("+", binop(Operator::Add)),
        ("-", binop(Operator::Sub)),
        ("*", binop(Operator::Mul)),
        ("/", binop(Operator::Div)),
        ("%", binop(Operator::Mod)),
        ("&", binop(Operator::BitAnd)),
        ("|", binop(Operator::BitOr)),
        ("^", binop(Operator::BitXor)),
        ("<<", binop(Operator::Shl)),
        (">>", binop(Operator::Shr)),
        ("&&", binop(Operator::And)),
        ("||", binop(Operator::Or)),
        ("~", unop(Operator::BitNot)),
        ("!", unop(Operator::Not)),
    ]
}
