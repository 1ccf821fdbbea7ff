//! The five-node abstract syntax tree that both back-ends (the tree-walking
//! interpreter and the bytecode compiler) consume. Ionia's values are closed
//! over this same tree at eval time, so nodes are cheap to deep-clone rather
//! than shared: `eval`/`compile` live as pattern-match functions on the
//! owning `Interpreter`/`CodeGen`, not as virtual methods on `Ast` itself.

use std::fmt;

/// A program is a flat sequence of top-level statements, each an `Ast`.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// A symbol reference.
    Id(String),
    /// A signed 32-bit integer literal.
    Num(i32),
    /// `name = expr` — introduces a binding in the current scope.
    Define(String, Box<Ast>),
    /// `(p1, p2, ...): body` — an anonymous function value.
    Func(Vec<String>, Box<Ast>),
    /// `callee(arg1, arg2, ...)` — application; `callee` is itself an
    /// expression so that `f(x)(y)` chains.
    FunCall(Box<Ast>, Vec<Ast>),
}

impl Ast {
    pub fn id(name: impl Into<String>) -> Ast {
        Ast::Id(name.into())
    }

    pub fn define(name: impl Into<String>, expr: Ast) -> Ast {
        Ast::Define(name.into(), Box::new(expr))
    }

    pub fn func(params: Vec<String>, body: Ast) -> Ast {
        Ast::Func(params, Box::new(body))
    }

    pub fn call(callee: Ast, args: Vec<Ast>) -> Ast {
        Ast::FunCall(Box::new(callee), args)
    }

    /// True if this `Define`'s bound name should be recorded as a
    /// global-callable (its name starts with `$`).
    pub fn is_global_name(name: &str) -> bool {
        name.starts_with('$')
    }
}

/// Renders an `Ast` back to source text in the grammar it was parsed from.
/// Re-parsing the result must produce a structurally equal tree; whitespace
/// and comments are not round-tripped, only structure.
impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Id(name) => write!(f, "{}", name),
            Ast::Num(n) => write!(f, "{}", n),
            Ast::Define(name, expr) => write!(f, "{}={}", name, expr),
            Ast::Func(params, body) => write!(f, "({}):{}", params.join(","), body),
            Ast::FunCall(callee, args) => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", callee, rendered.join(","))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unparse_constant() {
        let ast = Ast::call(Ast::id("<<<"), vec![Ast::Num(42)]);
        assert_eq!(ast.to_string(), "<<<(42)");
    }

    #[test]
    fn unparse_func_and_chain() {
        let adder = Ast::define(
            "adder",
            Ast::func(
                vec!["x".to_string()],
                Ast::func(vec!["y".to_string()], Ast::call(Ast::id("+"), vec![Ast::id("x"), Ast::id("y")])),
            ),
        );
        assert_eq!(adder.to_string(), "adder=(x):(y):+(x,y)");
    }

    #[test]
    fn equality_is_structural() {
        let a = Ast::Num(1);
        let b = Ast::Num(1);
        assert_eq!(a, b);
        assert_ne!(Ast::Num(1), Ast::Num(2));
    }
}
