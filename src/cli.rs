//! Argument handling and mode dispatch for the `ionia` binary: a hand-rolled
//! scan over `std::env::args()` into an `Options` struct, threaded
//! explicitly through each mode rather than read back out of any global
//! configuration state.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::bytecode::program::Program;
use crate::compiler::CodeGen;
use crate::disasm::disassemble;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::repl;
use crate::source::Source;
use crate::vm::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interpret,
    Compile,
    CompileRun,
    RunVm,
    Disassemble,
}

#[derive(Debug)]
pub struct Options {
    pub mode: Mode,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub print: bool,
    pub help: bool,
    pub version: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options { mode: Mode::Interpret, input: None, output: None, print: false, help: false, version: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError {
    pub message: String,
}

impl ArgError {
    fn new(message: impl Into<String>) -> ArgError {
        ArgError { message: message.into() }
    }
}

/// Scans a flag/positional argument list into `Options`. Mode selectors are
/// mutually exclusive; the last one given wins rather than erroring, since
/// that is the simplest behavior a hand-rolled scan can give without extra
/// bookkeeping.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Options, ArgError> {
    let mut opts = Options::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => opts.help = true,
            "-v" | "--version" => opts.version = true,
            "-p" | "--print" => opts.print = true,
            "-i" | "--interpret" => opts.mode = Mode::Interpret,
            "-c" | "--compile" => opts.mode = Mode::Compile,
            "-cr" | "--compile-run" => opts.mode = Mode::CompileRun,
            "-r" | "--run-vm" => opts.mode = Mode::RunVm,
            "-d" | "--disassemble" => opts.mode = Mode::Disassemble,
            "-o" | "--output" => {
                let path = iter.next().ok_or_else(|| ArgError::new("-o/--output requires a path"))?;
                opts.output = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => return Err(ArgError::new(format!("unrecognized flag: {}", other))),
            other => opts.input = Some(PathBuf::from(other)),
        }
    }
    Ok(opts)
}

pub const HELP_TEXT: &str = "\
Usage: ionia [options] [input]

Modes (mutually exclusive, default -i):
  -i, --interpret      lex, parse, interpret
  -c, --compile        compile to bytecode (see -o)
  -cr, --compile-run   compile in memory, then run on the VM
  -r, --run-vm         load a bytecode file and run it on the VM
  -d, --disassemble    load a bytecode file and print its disassembly

Options:
  -o, --output <path>  output path (default out.ibc for -c, stdout for -d)
  -p, --print          REPL echo of each parsed statement's unparsed form
  -h, --help           print this message and exit
  -v, --version        print the version and exit

No input (or -p alone) enters the REPL.
";

pub fn version_text() -> String {
    format!(
        "ionia {}.{}.{}",
        crate::bytecode::VERSION_MAJOR,
        crate::bytecode::VERSION_MINOR,
        crate::bytecode::VERSION_PATCH
    )
}

/// Runs the selected mode to completion and returns the process exit code.
pub fn run(opts: Options) -> i32 {
    if opts.help {
        print!("{}", HELP_TEXT);
        return 0;
    }
    if opts.version {
        println!("{}", version_text());
        return 0;
    }
    if opts.input.is_none() && (opts.mode == Mode::Interpret) {
        return repl::run(opts.print);
    }

    let input = match &opts.input {
        Some(path) => path.clone(),
        None => {
            eprintln!("error: no input file given");
            return 1;
        }
    };

    match opts.mode {
        Mode::Interpret => run_interpret(&input),
        Mode::Compile => run_compile(&input, opts.output.unwrap_or_else(|| PathBuf::from("out.ibc"))),
        Mode::CompileRun => run_compile_run(&input),
        Mode::RunVm => run_vm(&input),
        Mode::Disassemble => run_disassemble(&input, opts.output),
    }
}

fn load_source(path: &PathBuf) -> Result<Source, i32> {
    Source::path(path).map_err(|e| {
        eprintln!("error: could not read {}: {}", path.display(), e);
        1
    })
}

fn run_interpret(path: &PathBuf) -> i32 {
    let source = match load_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (program, parse_errs) = Parser::parse_program(&source.contents);
    let mut interp = Interpreter::new();
    interp.run_program(&program);
    (parse_errs + interp.error_count) as i32
}

fn run_compile(path: &PathBuf, output: PathBuf) -> i32 {
    let source = match load_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (program_ast, parse_errs) = Parser::parse_program(&source.contents);
    let program = CodeGen::compile_program(&program_ast);
    if let Err(e) = fs::File::create(&output).and_then(|mut f| f.write_all(&program.to_bytes())) {
        eprintln!("error: could not write {}: {}", output.display(), e);
        return (parse_errs as i32) + 1;
    }
    parse_errs as i32
}

fn run_compile_run(path: &PathBuf) -> i32 {
    let source = match load_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (program_ast, parse_errs) = Parser::parse_program(&source.contents);
    let bytecode = CodeGen::compile_program(&program_ast);
    let mut vm = Vm::new(bytecode);
    let _ = vm.run();
    (parse_errs + vm.error_count) as i32
}

fn run_vm(path: &PathBuf) -> i32 {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read {}: {}", path.display(), e);
            return 1;
        }
    };
    let program = match Program::from_bytes(&bytes) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    let mut vm = Vm::new(program);
    let _ = vm.run();
    vm.error_count as i32
}

fn run_disassemble(path: &PathBuf, output: Option<PathBuf>) -> i32 {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read {}: {}", path.display(), e);
            return 1;
        }
    };
    let program = match Program::from_bytes(&bytes) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    let text = disassemble(&program);
    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, text) {
                eprintln!("error: could not write {}: {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", text),
    }
    0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_mode_is_interpret() {
        let opts = parse_args(vec!["prog.ion".to_string()]).unwrap();
        assert_eq!(opts.mode, Mode::Interpret);
        assert_eq!(opts.input, Some(PathBuf::from("prog.ion")));
    }

    #[test]
    fn parses_compile_with_output() {
        let opts = parse_args(vec!["-c".to_string(), "-o".to_string(), "a.ibc".to_string(), "x.ion".to_string()]).unwrap();
        assert_eq!(opts.mode, Mode::Compile);
        assert_eq!(opts.output, Some(PathBuf::from("a.ibc")));
        assert_eq!(opts.input, Some(PathBuf::from("x.ion")));
    }

    #[test]
    fn unrecognized_flag_is_an_error() {
        assert!(parse_args(vec!["--bogus".to_string()]).is_err());
    }

    #[test]
    fn no_input_and_no_print_flag_defaults_to_none() {
        let opts = parse_args(Vec::<String>::new()).unwrap();
        assert_eq!(opts.input, None);
        assert!(!opts.print);
    }
}
