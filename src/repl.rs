//! The line-oriented REPL: a thin wrapper over `BufRead::read_line`, not a
//! line-editing crate. One `Interpreter` persists across the whole session
//! so bindings accumulate line to line, matching how a script's statements
//! accumulate in one root frame.

use std::io::{self, BufRead, Write};

use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::source::Source;

/// Runs the REPL loop against stdin/stdout until EOF or `:quit`. Returns 0
/// always: the REPL reports each line's errors immediately to stderr rather
/// than accumulating an exit code.
pub fn run(print: bool) -> i32 {
    let stdin = io::stdin();
    let mut interp = Interpreter::new();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();
        line.clear();
        let read = stdin.lock().read_line(&mut line);
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("error: could not read stdin: {}", e);
                break;
            }
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == ":quit" {
            break;
        }
        if trimmed.trim().is_empty() {
            continue;
        }

        let source = Source::repl_line(trimmed);
        let (program, _parse_errs) = Parser::parse_program(&source.contents);
        let root = interp.root.clone();
        for stmt in &program {
            if print {
                println!("{}", stmt);
            }
            if interp.eval(stmt, &root).is_err() {
                break;
            }
        }
    }
    0
}
