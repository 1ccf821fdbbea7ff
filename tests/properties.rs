//! Property-based tests: grammar round-trip, interpreter/VM output
//! equivalence, and bytecode round-trip, generated with `proptest` over
//! small synthetic programs rather than hand-picked examples.

use proptest::prelude::*;

use ionia::ast::Ast;
use ionia::compiler::CodeGen;
use ionia::interpreter::Interpreter;
use ionia::parser::Parser;
use ionia::vm::{Vm, VmValue};

fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,4}".prop_filter("not a keyword-shaped identifier", |s| s != "is")
}

fn arb_number() -> impl Strategy<Value = i32> {
    0i32..1000
}

/// Builds a small arithmetic AST over `+`/`-`/`*` applied to literals and a
/// handful of bound names, so both round-trip and equivalence checks have
/// something nontrivial to chew on.
fn arb_arith_program() -> impl Strategy<Value = (Vec<Ast>, i32)> {
    (arb_number(), arb_number(), arb_number()).prop_map(|(a, b, c)| {
        let expr = Ast::call(
            Ast::id("+"),
            vec![Ast::call(Ast::id("*"), vec![Ast::Num(a), Ast::Num(b)]), Ast::Num(c)],
        );
        let expected = a.wrapping_mul(b).wrapping_add(c);
        let program = vec![Ast::define("result", expr), Ast::call(Ast::id("<<<"), vec![Ast::id("result")])];
        (program, expected)
    })
}

proptest! {
    #[test]
    fn unparse_then_reparse_is_structurally_equal(name in arb_ident(), n in arb_number()) {
        let ast = Ast::define(name, Ast::Num(n));
        let text = ast.to_string();
        let (reparsed, errs) = Parser::parse_program(&text);
        prop_assert_eq!(errs, 0);
        prop_assert_eq!(reparsed.len(), 1);
        prop_assert_eq!(&reparsed[0], &ast);
    }

    #[test]
    fn interpreter_and_vm_agree_on_generated_arithmetic((program, expected) in arb_arith_program()) {
        let mut interp = Interpreter::new();
        let root = interp.root.clone();
        let mut interp_result = None;
        for stmt in &program {
            match interp.eval(stmt, &root) {
                Ok(v) => interp_result = v.as_integer(),
                Err(_) => break,
            }
        }
        prop_assert_eq!(interp.error_count, 0);
        prop_assert_eq!(interp_result, Some(expected));

        let bytecode = CodeGen::compile_program(&program);
        let mut vm = Vm::new(bytecode);
        let _ = vm.run();
        prop_assert_eq!(vm.error_count, 0);
        let vm_result = match vm.valreg() {
            VmValue::Int(n) => Some(*n),
            VmValue::Closure { .. } => None,
        };
        prop_assert_eq!(vm_result, Some(expected));
    }

    #[test]
    fn bytecode_serialization_round_trips(name in arb_ident(), n in arb_number()) {
        let program_ast = vec![Ast::define(name, Ast::Num(n))];
        let program = CodeGen::compile_program(&program_ast);
        let bytes = program.to_bytes();
        let back = ionia::bytecode::program::Program::from_bytes(&bytes).unwrap();
        prop_assert_eq!(back.symbols, program.symbols);
        prop_assert_eq!(back.pc_table, program.pc_table);
        prop_assert_eq!(back.globals, program.globals);
        prop_assert_eq!(back.code, program.code);
    }
}
