//! Sparnel command-line driver.
//!
//! One binary, mutually exclusive modes: execute argument strings,
//! compile sources to `.spo`, disassemble compiled files, dump ASTs, run
//! a script file, or (with no file at all) drop into the REPL.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context as _};
use clap::{ArgGroup, Parser};
use sparnel_types::Value;
use sparnel_vm::Context;

mod repl;
mod stdlib;

/// Source file extension.
const SOURCE_EXT: &str = "spn";
/// Compiled bytecode file extension.
const OBJECT_EXT: &str = "spo";

#[derive(Parser)]
#[command(name = "sparnel", version, about = "The Sparnel scripting language")]
#[command(group = ArgGroup::new("mode").args(["execute", "compile", "disasm", "dump_ast"]))]
struct Cli {
    /// Treat the remaining arguments as source strings and execute them.
    #[arg(long)]
    execute: bool,

    /// Compile source files to companion `.spo` files.
    #[arg(long)]
    compile: bool,

    /// Pretty-print compiled bytecode files.
    #[arg(long)]
    disasm: bool,

    /// Print the AST of source files.
    #[arg(long = "dump-ast")]
    dump_ast: bool,

    /// Print nil results too.
    #[arg(long = "print-nil")]
    print_nil: bool,

    /// Print the return value of executed strings and scripts.
    #[arg(long = "print-ret")]
    print_ret: bool,

    /// A script file followed by its arguments, or the operands of the
    /// selected mode. Everything after the first operand belongs to the
    /// script.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("sparnel: {err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.execute {
        execute_strings(cli)
    } else if cli.compile {
        compile_files(&cli.args)
    } else if cli.disasm {
        disasm_files(&cli.args)
    } else if cli.dump_ast {
        dump_ast_files(&cli.args)
    } else if cli.args.is_empty() {
        repl::run(cli.print_nil)
    } else {
        run_script(cli)
    }
}

/// Fresh context with the seed library registered.
fn new_context() -> Context {
    let mut ctx = Context::new();
    stdlib::register(&mut ctx);
    ctx
}

fn execute_strings(cli: &Cli) -> anyhow::Result<()> {
    if cli.args.is_empty() {
        bail!("--execute needs at least one source string");
    }
    let mut ctx = new_context();
    for source in &cli.args {
        let value = eval_reporting(&mut ctx, source)?;
        if cli.print_ret && (cli.print_nil || value != Value::Nil) {
            println!("{value}");
        }
    }
    Ok(())
}

fn compile_files(files: &[String]) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("--compile needs at least one source file");
    }
    for file in files {
        let path = Path::new(file);
        let source =
            std::fs::read_to_string(path).with_context(|| format!("reading {file}"))?;
        let program = sparnel_compiler::compile_source(&source)
            .with_context(|| format!("compiling {file}"))?;
        let out = path.with_extension(OBJECT_EXT);
        std::fs::write(&out, program.to_bytes())
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(())
}

fn disasm_files(files: &[String]) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("--disasm needs at least one bytecode file");
    }
    for file in files {
        let bytes = std::fs::read(file).with_context(|| format!("reading {file}"))?;
        let program =
            sparnel_asm::Program::from_bytes(&bytes).with_context(|| format!("decoding {file}"))?;
        print!("{}", sparnel_asm::disassemble(&program));
    }
    Ok(())
}

fn dump_ast_files(files: &[String]) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("--dump-ast needs at least one source file");
    }
    for file in files {
        let source = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
        let ast =
            sparnel_compiler::parse_source(&source).with_context(|| format!("parsing {file}"))?;
        print!("{}", sparnel_compiler::ast::dump(&ast));
    }
    Ok(())
}

fn run_script(cli: &Cli) -> anyhow::Result<()> {
    let (file, script_args) = cli.args.split_first().expect("checked non-empty");
    let path = PathBuf::from(file);

    let mut ctx = new_context();
    ctx.set_script_args(script_args.iter().map(|a| Value::from(a.as_str())).collect());

    let func = if path.extension().and_then(|e| e.to_str()) == Some(OBJECT_EXT) {
        let bytes = std::fs::read(&path).with_context(|| format!("reading {file}"))?;
        ctx.load_binary(&bytes)
            .map_err(|e| anyhow::anyhow!("{e}"))?
    } else {
        let source =
            std::fs::read_to_string(&path).with_context(|| format!("reading {file}"))?;
        ctx.load_source(&source).map_err(|e| anyhow::anyhow!("{e}"))?
    };

    match ctx.call(&func, &[]) {
        Ok(value) => {
            if cli.print_ret && (cli.print_nil || value != Value::Nil) {
                println!("{value}");
            }
            Ok(())
        }
        Err(err) => bail!("{}", render_error(&ctx, &err)),
    }
}

fn eval_reporting(ctx: &mut Context, source: &str) -> anyhow::Result<Value> {
    ctx.eval_source(source)
        .map_err(|err| anyhow::anyhow!("{}", render_error(ctx, &err)))
}

/// One-line message, plus the stack trace for runtime errors.
fn render_error(ctx: &Context, err: &sparnel_vm::Error) -> String {
    match ctx.backtrace() {
        Some(bt) if !bt.is_empty() => format!("{err}\n{bt}"),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["sparnel", "--execute", "--compile"]).is_err());
        assert!(Cli::try_parse_from(["sparnel", "--disasm", "--dump-ast"]).is_err());
        let cli = Cli::try_parse_from(["sparnel", "--execute", "return 1;"]).unwrap();
        assert!(cli.execute);
        assert_eq!(cli.args, ["return 1;"]);
    }

    #[test]
    fn script_arguments_follow_the_file() {
        let cli = Cli::try_parse_from(["sparnel", "script.spn", "a", "b"]).unwrap();
        assert_eq!(cli.args, ["script.spn", "a", "b"]);
    }

    #[test]
    fn print_flags_combine_with_any_mode() {
        let cli =
            Cli::try_parse_from(["sparnel", "--execute", "--print-ret", "--print-nil", "x"])
                .unwrap();
        assert!(cli.print_ret && cli.print_nil);
    }
}
