use std::{env, fs, path::Path, process::ExitCode};

use apicase::{expand_document, load_document};

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    if args.len() < 3 {
        return Err("not enough arguments".to_string());
    }

    let command = args[1].as_str();
    let file = Path::new(&args[2]);

    match command {
        "lint" => run_lint(file),
        "expand" => {
            let pretty = parse_expand_options(&args[3..])?;
            run_expand(file, pretty)
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_expand_options(args: &[String]) -> Result<bool, String> {
    let mut pretty = false;
    for arg in args {
        match arg.as_str() {
            "--pretty" => pretty = true,
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    Ok(pretty)
}

fn run_lint(file: &Path) -> Result<(), String> {
    let input = read_input(file)?;
    let document =
        load_document(&input).map_err(|err| format!("{}: {err}", file.display()))?;
    // expansion surfaces unbound variables and oversized products
    let cases = expand_document(&document)
        .map_err(|err| format!("{}: {err}", file.display()))?;
    println!("{}: ok ({} case(s))", file.display(), cases.len());
    Ok(())
}

fn run_expand(file: &Path, pretty: bool) -> Result<(), String> {
    let input = read_input(file)?;
    let document =
        load_document(&input).map_err(|err| format!("{}: {err}", file.display()))?;
    let cases = expand_document(&document)
        .map_err(|err| format!("{}: {err}", file.display()))?;
    let rendered: Vec<serde_json::Value> = cases.iter().map(|case| case.describe()).collect();
    let output = if pretty {
        serde_json::to_string_pretty(&rendered)
    } else {
        serde_json::to_string(&rendered)
    }
    .map_err(|err| err.to_string())?;
    println!("{output}");
    Ok(())
}

fn read_input(file: &Path) -> Result<String, String> {
    fs::read_to_string(file).map_err(|err| format!("cannot read {}: {err}", file.display()))
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  apicase lint <file>");
    eprintln!("  apicase expand <file> [--pretty]");
}
