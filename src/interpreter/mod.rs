//! The tree-walking back-end: a recursive evaluator over `Ast`, with a
//! chained, reference-counted lexical environment shared with closures.
//! Built-ins are registered as *pseudo-functions* — closures whose body is a
//! native callback rather than an `Ast` — so the call protocol (arity
//! check, fresh-frame argument binding) is identical for user and built-in
//! functions.

pub mod builtins;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Ast;

/// A lexical frame: bindings plus an optional outer frame. Environments are
/// acyclic because closures only ever capture a strictly-outer frame, so
/// `Rc` (no weak references, no cycle collector) is sufficient.
pub struct Scope {
    slots: HashMap<String, Value>,
    outer: Option<Environment>,
}

pub type Environment = Rc<RefCell<Scope>>;

pub fn new_root() -> Environment {
    Rc::new(RefCell::new(Scope { slots: HashMap::new(), outer: None }))
}

pub fn new_child(outer: &Environment) -> Environment {
    Rc::new(RefCell::new(Scope { slots: HashMap::new(), outer: Some(outer.clone()) }))
}

/// Walks the chain outward from `env`, returning the first binding found.
pub fn lookup(env: &Environment, name: &str) -> Option<Value> {
    let scope = env.borrow();
    if let Some(v) = scope.slots.get(name) {
        return Some(v.clone());
    }
    match &scope.outer {
        Some(outer) => lookup(outer, name),
        None => None,
    }
}

/// Insertion always targets the innermost scope.
pub fn bind(env: &Environment, name: impl Into<String>, value: Value) {
    env.borrow_mut().slots.insert(name.into(), value);
}

/// A closure's body: either a user function (an owned `Ast` clone) or a
/// native built-in callback.
pub enum Body {
    User(Ast),
    Native(NativeFn),
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &Environment) -> Result<Value, EvalError>>;

pub struct ClosureObj {
    pub params: Vec<String>,
    pub env: Environment,
    pub body: Body,
}

#[derive(Clone)]
pub enum Value {
    Integer(i32),
    Closure(Rc<ClosureObj>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Closure(_) => None,
        }
    }
}

/// Closures compare by reference identity of their shared `ClosureObj`;
/// integers compare numerically.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Closure(c) => write!(f, "<function at: {:#x}>", Rc::as_ptr(c) as usize),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> EvalError {
        EvalError { message: message.into() }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error(interpreter): {}", self.message)
    }
}

/// A hook consulted before a failed `Id` lookup is reported as "not found".
pub type MissingHook = Box<dyn FnMut(&str) -> Option<Value>>;

pub struct Interpreter {
    pub root: Environment,
    pub error_count: usize,
    pub missing_hook: Option<MissingHook>,
}

impl Interpreter {
    /// Builds an interpreter with a fresh `ext` environment containing all
    /// 24 built-ins, and a user root frame atop it.
    pub fn new() -> Interpreter {
        let ext = new_root();
        builtins::register(&ext);
        let root = new_child(&ext);
        Interpreter { root, error_count: 0, missing_hook: None }
    }

    fn report(&mut self, err: EvalError) {
        eprintln!("{}", err);
        self.error_count += 1;
    }

    /// Runs a whole program against the persistent root frame, halting at
    /// the first semantic error (the VM's and the interpreter's error
    /// policy both stop execution at the first failure, unlike the lexer
    /// and parser, which accumulate).
    pub fn run_program(&mut self, program: &[Ast]) {
        let root = self.root.clone();
        for stmt in program {
            if self.eval(stmt, &root).is_err() {
                break;
            }
        }
    }

    pub fn eval(&mut self, ast: &Ast, env: &Environment) -> Result<Value, EvalError> {
        match ast {
            Ast::Id(name) => match lookup(env, name) {
                Some(v) => Ok(v),
                None => {
                    if let Some(hook) = self.missing_hook.as_mut() {
                        if let Some(v) = hook(name) {
                            return Ok(v);
                        }
                    }
                    let err = EvalError::new(format!("identifier not found: {}", name));
                    self.report(err.clone());
                    Err(err)
                }
            },
            Ast::Num(n) => Ok(Value::Integer(*n)),
            Ast::Define(name, expr) => {
                let value = self.eval(expr, env)?;
                bind(env, name.clone(), value.clone());
                Ok(value)
            }
            Ast::Func(params, body) => Ok(Value::Closure(Rc::new(ClosureObj {
                params: params.clone(),
                env: env.clone(),
                body: Body::User((**body).clone()),
            }))),
            Ast::FunCall(callee, args) => {
                let callee_val = self.eval(callee, env)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.eval(arg, env)?);
                }
                self.call(callee_val, arg_vals)
            }
        }
    }

    /// The standard call prologue: arity-check, bind positionally into a
    /// fresh frame whose outer is the closure's captured environment, then
    /// either evaluate the user body or dispatch to the native callback.
    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        let closure = match callee {
            Value::Closure(c) => c,
            Value::Integer(_) => {
                let err = EvalError::new("attempted to call a non-function value");
                self.report(err.clone());
                return Err(err);
            }
        };
        if closure.params.len() != args.len() {
            let err = EvalError::new(format!(
                "argument count mismatch: expected {}, found {}",
                closure.params.len(),
                args.len()
            ));
            self.report(err.clone());
            return Err(err);
        }
        let frame = new_child(&closure.env);
        for (param, value) in closure.params.iter().zip(args.into_iter()) {
            bind(&frame, param.clone(), value);
        }
        match &closure.body {
            Body::User(body_ast) => self.eval(body_ast, &frame),
            Body::Native(f) => f.as_ref()(self, &frame).map_err(|err| {
                self.report(err.clone());
                err
            }),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        Interpreter::new()
    }
}

impl Clone for EvalError {
    fn clone(&self) -> EvalError {
        EvalError { message: self.message.clone() }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::Parser;

    fn run(source: &str) -> (Value, usize) {
        let (program, errs) = Parser::parse_program(source);
        assert_eq!(errs, 0, "unexpected parse errors for {:?}", source);
        let mut interp = Interpreter::new();
        let root = interp.root.clone();
        let mut last = Value::Integer(0);
        for stmt in &program {
            match interp.eval(stmt, &root) {
                Ok(v) => last = v,
                Err(_) => break,
            }
        }
        (last, interp.error_count)
    }

    #[test]
    fn closures_capture_by_reference_not_substitution() {
        let (v, errs) = run("mk=(x):(): x\nf=mk(7)\nf()");
        assert_eq!(errs, 0);
        assert_eq!(v.as_integer(), Some(7));
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let (program, errs) = Parser::parse_program("f=(x):x\nf()");
        assert_eq!(errs, 0);
        let mut interp = Interpreter::new();
        let root = interp.root.clone();
        interp.eval(&program[0], &root).unwrap();
        let result = interp.eval(&program[1], &root);
        assert!(result.is_err());
        assert_eq!(interp.error_count, 1);
    }

    #[test]
    fn undefined_identifier_reports_not_found() {
        let (program, _) = Parser::parse_program("nope");
        let mut interp = Interpreter::new();
        let root = interp.root.clone();
        let err = interp.eval(&program[0], &root).unwrap_err();
        assert!(err.message.contains("not found"));
        assert!(err.message.contains("nope"));
    }
}
