//! Interactive read-eval-print loop.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sparnel_types::Value;
use sparnel_vm::{Context, Error, ErrorKind};

const PROMPT: &str = "spn> ";

/// Run the REPL until EOF or interrupt.
pub fn run(print_nil: bool) -> anyhow::Result<()> {
    let mut ctx = Context::new();
    crate::stdlib::register(&mut ctx);

    let mut editor = DefaultEditor::new()?;
    println!("sparnel {} — ctrl-d to exit", env!("CARGO_PKG_VERSION"));

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match eval_line(&mut ctx, line) {
                    Ok(value) => {
                        if print_nil || value != Value::Nil {
                            println!("{value}");
                        }
                    }
                    Err(err) => {
                        eprintln!("{err}");
                        if let Some(bt) = ctx.backtrace().filter(|bt| !bt.is_empty()) {
                            eprintln!("{bt}");
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Evaluate a line as an expression first, so `1 + 2` prints; fall back
/// to statement form for declarations and control flow.
fn eval_line(ctx: &mut Context, line: &str) -> Result<Value, Error> {
    match ctx.eval_expression(line) {
        Ok(value) => Ok(value),
        Err(expr_err) if expr_err.kind() == ErrorKind::Syntax => ctx.eval_source(line),
        Err(err) => Err(err),
    }
}
