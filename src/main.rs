mod ast;
mod msil_generator;
mod semantic_analyzer;

use std::env;
use std::fs::{read_to_string, File};
use std::io::{Result, Write};
use std::process::exit;

use ast::ast_def::TreeNode;

fn main() -> Result<()> {
    // Arguments: mode input -o output
    env_logger::init();

    let mut args = env::args();
    args.next();
    let mode = args.next().unwrap();
    let input = args.next().unwrap();
    assert_eq!(args.next().as_deref(), Some("-o"));
    let output = args.next().unwrap();

    let source = read_to_string(input)?;
    let prog = match ast::parse(&source) {
        Ok(prog) => prog,
        Err(err) => {
            eprintln!("error: {}", err);
            exit(1);
        }
    };
    let prog = match semantic_analyzer::analyze_program(prog) {
        Ok(prog) => prog,
        Err(err) => {
            eprintln!("error: {}", err);
            exit(1);
        }
    };

    let mut file = File::create(output)?;
    match mode.as_str() {
        "-tree" => {
            for line in prog.tree_lines() {
                writeln!(file, "{}", line)?;
            }
        }
        "-msil" => match msil_generator::generate_program(&prog) {
            Ok(code) => {
                for line in code {
                    writeln!(file, "{}", line)?;
                }
            }
            Err(err) => {
                eprintln!("internal error: {}", err);
                exit(1);
            }
        },
        other => {
            eprintln!("unknown mode {}", other);
            exit(1);
        }
    }

    return Ok(());
}
