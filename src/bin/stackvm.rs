//! Command line front end for the stack VM.
//!
//! Assembles a source file to bytecode, optionally runs it, or disassembles an
//! existing bytecode file.
//!
//! # Usage
//! ```text
//! stackvm <input> [OPTIONS]
//! ```
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`, or stdout
//!   when disassembling)
//! - `-r, --run`: Run the assembled program
//! - `-d, --disassemble`: Treat the input as bytecode and print its assembly
//! - `-s, --set <name>`: Instruction set, `mini` (default) or `mixed`
//! - `-v, --verbose`: Debug logging, `-vv` for traces
//!
//! # Examples
//! ```text
//! stackvm countdown.asm -r
//! stackvm countdown.asm -o out/countdown.bin
//! stackvm countdown.bin -d
//! ```

use stackvm::instruction_sets::{InstructionSet, StdConsole};
use stackvm::utils::log::{self, Level};
use stackvm::virtual_machine::assembler::render_diagnostic;
use stackvm::virtual_machine::program::Program;
use stackvm::virtual_machine::vm::Vm;
use stackvm::{debug, error, info};
use std::env;
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

fn main() {
    install_panic_hook();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut run = false;
    let mut disassemble = false;
    let mut set = InstructionSet::Mini;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
            }
            k @ ("--set" | "-s") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                set = InstructionSet::from_name(&args[i]).unwrap_or_else(|| {
                    error!("Unknown instruction set: '{}' (expected mini or mixed)", args[i]);
                    process::exit(1);
                });
            }
            "--run" | "-r" => run = true,
            "--disassemble" | "-d" => disassemble = true,
            "--verbose" | "-v" => log::set_max_level(Level::Debug),
            "-vv" => log::set_max_level(Level::Trace),
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    if run && disassemble {
        error!("--run and --disassemble cannot be combined");
        process::exit(1);
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let table = set.table(Arc::new(StdConsole)).unwrap_or_else(|e| {
        error!("Invalid instruction set '{}': {}", set.name(), e);
        process::exit(1);
    });
    let mut vm = Vm::new(Arc::new(table));

    if disassemble {
        disassemble_file(&vm, input_path, output_path.as_deref());
        return;
    }

    let source = fs::read_to_string(input_path).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", input_path, e);
        process::exit(1);
    });

    let assembled = vm.assemble(&source);
    let program = match assembled.into_result() {
        Ok(program) => program,
        Err(e) => {
            error!("{}", render_diagnostic(input_path, &source, &e).trim_end());
            process::exit(1);
        }
    };

    // running without an explicit output skips writing the bytecode
    if !run || output_path.is_some() {
        let output_path = output_path
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_path(Path::new(input_path)));
        write_program(&program, &output_path);
        info!(
            "Assembled {} -> {} ({} bytes)",
            input_path,
            output_path.display(),
            program.len()
        );
    }

    if run {
        let pass = vm.interpret(&program);
        if let Some(e) = pass.error() {
            error!("Execution failed with {}: {}", pass.status(), e);
            process::exit(1);
        }
        for id in vm.stack_ids() {
            let values = vm.stack(id).unwrap_or_default();
            if !values.is_empty() {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                info!("{}: [{}]", id, rendered.join(", "));
            }
        }
    }
}

/// A panicking instruction already ends its pass with `UNKNOWN_ERROR` and the
/// panic message; the hook output only shows up with `-v`.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| debug!("{info}")));
}

fn disassemble_file(vm: &Vm, input_path: &str, output_path: Option<&str>) {
    let program = Program::load(input_path).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", input_path, e);
        process::exit(1);
    });

    let pass = vm.disassemble(&program);
    let text = match pass.into_result() {
        Ok(text) => text,
        Err(e) => {
            error!("Disassembly failed: {}", e);
            process::exit(1);
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(path, &text) {
                error!("Failed to write output file: {}", e);
                process::exit(1);
            }
            info!("Disassembled {} -> {}", input_path, path);
        }
        None => print!("{text}"),
    }
}

fn write_program(program: &Program, path: &Path) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }
    if let Err(e) = program.save(path) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }
}

/// `<dir>/<stem>.bin` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}.bin"))
}

const USAGE: &str = "\
Stack VM assembler and interpreter

USAGE:
    {program} <input> [OPTIONS]

ARGS:
    <input>    Assembly source, or bytecode with --disassemble

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -r, --run               Run the assembled program
    -d, --disassemble       Print the assembly of a bytecode file
    -s, --set <name>        Instruction set: mini (default) or mixed
    -v, --verbose           Debug logging (-vv for traces)
    -h, --help              Print this help message

EXAMPLES:
    # Assemble to countdown.bin
    {program} countdown.asm

    # Assemble and run without writing bytecode
    {program} countdown.asm -r

    # Disassemble to stdout
    {program} countdown.bin -d
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackvm::virtual_machine::errors::VMError;
    use stackvm::virtual_machine::isa::{Instruction, InstructionTable, Outcome};
    use stackvm::virtual_machine::status::Status;

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("progs/countdown.asm")),
            PathBuf::from("progs/countdown.bin")
        );
        assert_eq!(
            default_output_path(Path::new("countdown")),
            PathBuf::from("countdown.bin")
        );
    }

    #[test]
    fn written_program_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.bin");
        let program = Program::from_bytes(vec![0x0, 0x1, 0x0, 0x0, 0x0]);
        write_program(&program, &path);
        assert_eq!(Program::load(&path).unwrap(), program);
    }

    #[test]
    fn panicking_instruction_ends_with_unknown_error() {
        install_panic_hook();
        let table = InstructionTable::builder()
            .instruction(
                Instruction::new("boom").callback(|_| -> Result<Outcome, VMError> {
                    panic!("callback exploded")
                }),
            )
            .build()
            .unwrap();
        let mut vm = Vm::new(Arc::new(table));
        let pass = vm.interpret(&Program::from_bytes(vec![0x0]));
        // back to the default hook for the rest of the test binary
        drop(panic::take_hook());

        assert_eq!(pass.status(), Status::UnknownError);
        match pass.error() {
            Some(VMError::Panic { message }) => assert_eq!(message, "callback exploded"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }
}
