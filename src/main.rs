use std::process::ExitCode;

fn main() -> ExitCode {
    let opts = match ionia::cli::parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {}", e.message);
            return ExitCode::from(1);
        }
    };
    let code = ionia::cli::run(opts);
    ExitCode::from(code.clamp(0, 255) as u8)
}
