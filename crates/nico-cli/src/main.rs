use std::{env, fs, io::Write as _, process::ExitCode};

use nico::{compile, CodeFile, CollectingLogger, FrontendContext, Repl, ReplConfig, ReplOutcome, Status};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut file_path = None;
    let mut emit_ir = false;
    let mut panic_recoverable = false;

    for arg in &args {
        match arg.as_str() {
            "--emit-ir" => emit_ir = true,
            "--panic-recoverable" => panic_recoverable = true,
            other if !other.starts_with('-') && file_path.is_none() => file_path = Some(other.to_string()),
            other => {
                eprintln!("error: unrecognized argument: {other}");
                return ExitCode::FAILURE;
            }
        }
    }

    // No backend exists in this crate; these flags are accepted for CLI
    // surface compatibility but have nothing to act on yet.
    if emit_ir {
        eprintln!("note: --emit-ir has no effect without a backend");
    }
    if panic_recoverable {
        eprintln!("note: --panic-recoverable has no effect without a backend");
    }

    match file_path {
        Some(path) => run_file(&path),
        None => run_repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match read_file(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = FrontendContext::new();
    let mut logger = CollectingLogger::new();
    compile(&mut ctx, CodeFile::new(source, 0), false, &mut logger);

    for diagnostic in logger.diagnostics() {
        eprintln!("{diagnostic}");
    }

    match ctx.status {
        Status::Ok => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn run_repl() -> ExitCode {
    let mut repl = Repl::new(ReplConfig::default());
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("{}", repl.current_prompt());
        let _ = std::io::stdout().flush();

        line.clear();
        let bytes_read = match stdin.read_line(&mut line) {
            Ok(n) => n,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        };
        if bytes_read == 0 {
            return ExitCode::SUCCESS;
        }
        let line = line.trim_end_matches(['\n', '\r']);

        match repl.submit_line(line) {
            ReplOutcome::Committed | ReplOutcome::WasReset => {}
            ReplOutcome::NeedsMoreInput => {}
            ReplOutcome::Discarded | ReplOutcome::DiscardedWarn => {
                for diagnostic in repl.diagnostics() {
                    eprintln!("{diagnostic}");
                }
            }
            ReplOutcome::CommandOutput(text) => println!("{text}"),
            ReplOutcome::Failed => {
                for diagnostic in repl.diagnostics() {
                    eprintln!("{diagnostic}");
                }
                return ExitCode::FAILURE;
            }
            ReplOutcome::Exit => return ExitCode::SUCCESS,
        }
    }
}

fn read_file(path: &str) -> Result<String, String> {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_file() => return Err(format!("{path} is not a file")),
        Ok(_) => {}
        Err(err) => return Err(format!("reading {path}: {err}")),
    }
    fs::read_to_string(path).map_err(|err| format!("reading {path}: {err}"))
}
