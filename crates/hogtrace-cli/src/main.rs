use std::{env, fs, process::ExitCode};

use hogtrace::{
    builtins::SystemClock, evaluator::eval as eval_expr, evaluator::EvalContext, frame::FrameContextBuilder,
    limits::Limits, parser::parse, request_store::RequestId, request_store::RequestStore,
};

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("parse") => parse_command(args.get(2)),
        Some("validate") => validate_command(args.get(2)),
        Some("eval") => eval_command(&args[2..]),
        _ => {
            eprintln!("usage: hogtrace <parse|validate|eval> ...");
            eprintln!("  parse <file>           print the parsed program");
            eprintln!("  validate <file>        exit 0 if the file parses, 1 otherwise");
            eprintln!("  eval <expr> [--arg k=v ...]   evaluate a standalone expression");
            ExitCode::FAILURE
        }
    }
}

fn parse_command(file_path: Option<&String>) -> ExitCode {
    let Some(file_path) = file_path else {
        eprintln!("usage: hogtrace parse <file>");
        return ExitCode::FAILURE;
    };
    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match parse(&source) {
        Ok(program) => {
            println!("{program:#?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn validate_command(file_path: Option<&String>) -> ExitCode {
    let Some(file_path) = file_path else {
        eprintln!("usage: hogtrace validate <file>");
        return ExitCode::FAILURE;
    };
    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match parse(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// `eval <source-string> [--arg key=value ...]`: wraps `source` as a
/// standalone predicate so a bare expression can be evaluated without a
/// whole probe program, builds a [`FrameContext`] from `--arg` flags, and
/// prints the resulting value (SPEC_FULL.md §C.5).
fn eval_command(rest: &[String]) -> ExitCode {
    let Some(source) = rest.first() else {
        eprintln!("usage: hogtrace eval <expr> [--arg key=value ...]");
        return ExitCode::FAILURE;
    };

    let mut frame_builder = FrameContextBuilder::new();
    let mut i = 1;
    while i < rest.len() {
        if rest[i] == "--arg" {
            let Some(binding) = rest.get(i + 1) else {
                eprintln!("--arg requires a key=value argument");
                return ExitCode::FAILURE;
            };
            let Some((key, value)) = binding.split_once('=') else {
                eprintln!("--arg expects 'key=value', got '{binding}'");
                return ExitCode::FAILURE;
            };
            frame_builder = frame_builder.local(key, parse_arg_value(value));
            i += 2;
        } else {
            eprintln!("unrecognized option '{}'", rest[i]);
            return ExitCode::FAILURE;
        }
    }

    let wrapped = format!("cli:eval:expr / {source} / {{ capture(unused=1); }}");
    let program = match parse(&wrapped) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let Some(predicate) = program.probes[0].predicate.as_ref() else {
        eprintln!("error: empty expression");
        return ExitCode::FAILURE;
    };

    let frame = frame_builder.build();
    let store = RequestStore::new();
    let limits = Limits::default();
    let clock = SystemClock;
    let mut rng = hogtrace::builtins::DefaultRng::default();
    let mut ctx = EvalContext::new(&frame, &store, RequestId::new(0), &limits, &clock, &mut rng);

    match eval_expr(&predicate.expression, &mut ctx) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_arg_value(raw: &str) -> hogtrace::Value {
    if let Ok(i) = raw.parse::<i64>() {
        hogtrace::Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        hogtrace::Value::Float(f)
    } else if raw == "true" || raw == "false" {
        hogtrace::Value::Bool(raw == "true")
    } else {
        hogtrace::Value::Str(raw.to_owned())
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) if !metadata.is_file() => return Err(format!("{file_path} is not a file")),
        Err(err) => return Err(format!("reading {file_path}: {err}")),
        Ok(_) => {}
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))
}
