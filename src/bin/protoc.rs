//! Compile a protocol DSL file to Go source.
//!
//! Usage:
//!   protoc -f <file> [-m <mode>]
//!
//! Options:
//!   -f FILE  protocol source file (required)
//!   -m MODE  output mode; `go` is the default and the only built-in mode
//!
//! Generated code goes to stdout, errors to stderr; the exit code is
//! non-zero on any parse, analysis, or emission failure.

use anyhow::{bail, Context};
use protodsl::{compile, EmitOptions, Mode};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut file: Option<String> = None;
    let mut mode_name = "go".to_string();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => {
                i += 1;
                match args.get(i) {
                    Some(v) => file = Some(v.clone()),
                    None => bail!("-f requires a file path"),
                }
            }
            "-m" => {
                i += 1;
                match args.get(i) {
                    Some(v) => mode_name = v.clone(),
                    None => bail!("-m requires a mode name"),
                }
            }
            "-h" | "--help" => {
                eprintln!("usage: protoc -f <file> [-m <mode>]");
                return Ok(());
            }
            other => bail!("unknown argument: {} (usage: protoc -f <file> [-m <mode>])", other),
        }
        i += 1;
    }

    let file = match file {
        Some(f) => f,
        None => bail!("protocol file not specified (usage: protoc -f <file> [-m <mode>])"),
    };
    let mode = match Mode::from_name(&mode_name) {
        Some(m) => m,
        None => bail!("unknown mode: {}", mode_name),
    };

    let source = std::fs::read_to_string(&file)
        .with_context(|| format!("read protocol file failed, file: {}", file))?;

    let opts = EmitOptions { source_name: file };
    let code = compile(&source, mode, &opts)?;
    print!("{}", code);
    Ok(())
}
