//! Registers the 24 built-ins as pseudo-functions in the `ext` environment.
//! Each one is a closure whose body is a native callback reading its bound
//! arguments by name from the fresh call frame the standard prologue built
//! for it — the same protocol user closures go through.

use std::io::{self, Write};
use std::rc::Rc;

use crate::core_ops::{apply_binary, apply_unary, Operator};

use super::{bind, Body, ClosureObj, Environment, EvalError, Interpreter, NativeFn, Value};

fn int_arg(env: &Environment, name: &str) -> Result<i32, EvalError> {
    match super::lookup(env, name) {
        Some(Value::Integer(n)) => Ok(n),
        Some(Value::Closure(_)) => Err(EvalError { message: format!("'{}' expected an integer, found a closure", name) }),
        None => Err(EvalError { message: format!("missing argument '{}'", name) }),
    }
}

fn closure_arg(env: &Environment, name: &str) -> Result<Value, EvalError> {
    match super::lookup(env, name) {
        Some(v @ Value::Closure(_)) => Ok(v),
        Some(Value::Integer(_)) => Err(EvalError { message: format!("'{}' expected a closure, found an integer", name) }),
        None => Err(EvalError { message: format!("missing argument '{}'", name) }),
    }
}

fn register_native(
    ext: &Environment,
    name: &str,
    params: &[&str],
    f: impl Fn(&mut Interpreter, &Environment) -> Result<Value, EvalError> + 'static,
) {
    let native: NativeFn = Rc::new(f);
    let closure = ClosureObj {
        params: params.iter().map(|s| s.to_string()).collect(),
        env: ext.clone(),
        body: Body::Native(native),
    };
    bind(ext, name, Value::Closure(Rc::new(closure)));
}

fn register_binop(ext: &Environment, name: &str, op: Operator) {
    register_native(ext, name, &["l", "r"], move |_interp, frame| {
        let l = int_arg(frame, "l")?;
        let r = int_arg(frame, "r")?;
        apply_binary(op, l, r).map(Value::Integer).map_err(|e| EvalError { message: e.to_string() })
    });
}

fn register_unop(ext: &Environment, name: &str, op: Operator) {
    register_native(ext, name, &["l"], move |_interp, frame| {
        let l = int_arg(frame, "l")?;
        Ok(Value::Integer(apply_unary(op, l)))
    });
}

pub fn register(ext: &Environment) {
    register_native(ext, "<<<", &["v"], |_interp, frame| {
        let v = super::lookup(frame, "v").expect("bound by call prologue");
        println!("{}", v);
        io::stdout().flush().ok();
        Ok(v)
    });

    register_native(ext, ">>>", &[], |_interp, _frame| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map_err(|e| EvalError { message: format!("read error: {}", e) })?;
        line.trim().parse::<i32>().map(Value::Integer).map_err(|_| EvalError { message: "expected a decimal integer on stdin".to_string() })
    });

    register_native(ext, "?", &["cond", "then", "else"], |interp, frame| {
        let cond = int_arg(frame, "cond")?;
        let branch = if cond != 0 { closure_arg(frame, "then")? } else { closure_arg(frame, "else")? };
        interp.call(branch, vec![])
    });

    register_native(ext, "is", &["l", "r"], |_interp, frame| {
        let l = super::lookup(frame, "l").ok_or_else(|| EvalError { message: "missing argument 'l'".to_string() })?;
        let r = super::lookup(frame, "r").ok_or_else(|| EvalError { message: "missing argument 'r'".to_string() })?;
        Ok(Value::Integer(if l == r { 1 } else { 0 }))
    });

    register_binop(ext, "eq", Operator::Eq);
    register_binop(ext, "neq", Operator::Neq);
    register_binop(ext, "lt", Operator::Lt);
    register_binop(ext, "le", Operator::Le);
    register_binop(ext, "gt", Operator::Gt);
    register_binop(ext, "ge", Operator::Ge);

    register_binop(ext, "+", Operator::Add);
    register_binop(ext, "-", Operator::Sub);
    register_binop(ext, "*", Operator::Mul);
    register_binop(ext, "/", Operator::Div);
    register_binop(ext, "%", Operator::Mod);
    register_binop(ext, "&", Operator::BitAnd);
    register_binop(ext, "|", Operator::BitOr);
    register_binop(ext, "^", Operator::BitXor);
    register_binop(ext, "<<", Operator::Shl);
    register_binop(ext, ">>", Operator::Shr);
    register_binop(ext, "&&", Operator::And);
    register_binop(ext, "||", Operator::Or);

    register_unop(ext, "~", Operator::BitNot);
    register_unop(ext, "!", Operator::Not);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interpreter::Interpreter;

    #[test]
    fn print_returns_its_argument() {
        let mut interp = Interpreter::new();
        let v = interp.call(super::super::lookup(&interp.root.clone(), "<<<").unwrap(), vec![Value::Integer(5)]).unwrap();
        assert_eq!(v.as_integer(), Some(5));
    }

    #[test]
    fn conditional_tail_calls_the_right_branch() {
        let mut interp = Interpreter::new();
        let ext = interp.root.clone();
        let cond_fn = super::super::lookup(&ext, "?").unwrap();
        let then_branch = Value::Closure(Rc::new(ClosureObj {
            params: vec![],
            env: ext.clone(),
            body: Body::Native(Rc::new(|_i, _f| Ok(Value::Integer(10)))),
        }));
        let else_branch = Value::Closure(Rc::new(ClosureObj {
            params: vec![],
            env: ext.clone(),
            body: Body::Native(Rc::new(|_i, _f| Ok(Value::Integer(20)))),
        }));
        let result = interp.call(cond_fn, vec![Value::Integer(1), then_branch, else_branch]).unwrap();
        assert_eq!(result.as_integer(), Some(10));
    }
}
