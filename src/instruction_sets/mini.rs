//! Minimal `u32` instruction set.
//!
//! Every value is a `u32` on [`VALUE_STACK`]; jump targets are byte offsets.
//! Arithmetic wraps.
//!
//! | opcode | name  | bytecode operands | pops      | pushes           |
//! |--------|-------|-------------------|-----------|------------------|
//! | 0      | push  | `v`               |           | `v`              |
//! | 1      | pop   |                   | `a`       |                  |
//! | 2      | read  |                   |           | line from input  |
//! | 3      | write |                   | `a`       |                  |
//! | 4      | dup   |                   | `a`       | `a a`            |
//! | 5      | eq    |                   | `a b`     | `0` if equal, else `1` |
//! | 6      | jz    | `target`          | `a`       | jumps if `a == 0` |
//! | 7      | jump  | `target`          |           |                  |
//! | 8      | add   |                   | `a b`     | `a + b`          |
//! | 9      | sub   |                   | `a b`     | `a - b`          |
//! | 10     | mul   |                   | `a b`     | `a * b`          |
//! | 11     | swap  |                   | `a b`     | `b a`            |
//! | 12     | rotln | `n`               | `n` items | rotated left by one |
//!
//! `a b` means `b` was on top.

use crate::instruction_sets::Console;
use crate::virtual_machine::codec::Endianness;
use crate::virtual_machine::errors::{ConfigError, VMError};
use crate::virtual_machine::isa::{Instruction, InstructionTable, Operands, Outcome};
use crate::virtual_machine::stack::VALUE_STACK;
use crate::virtual_machine::value::{Operand, Value, ValueType::U32};
use std::sync::Arc;

pub fn table(console: Arc<dyn Console>) -> Result<InstructionTable, ConfigError> {
    InstructionTable::builder()
        .endianness(Endianness::Little)
        .instructions([
            Instruction::new("push")
                .operand(U32)
                .produces(VALUE_STACK, U32)
                .pipe(),
            Instruction::new("pop").consumes(VALUE_STACK, U32).pipe(),
            read(console.clone()),
            write(console),
            Instruction::new("dup")
                .consumes(VALUE_STACK, U32)
                .produces(VALUE_STACK, U32)
                .produces(VALUE_STACK, U32)
                .callback(|ops| {
                    let a = ops.stack_at::<u32>(0)?;
                    Ok(Outcome::values([Value::from(a), Value::from(a)]))
                }),
            binary("eq", |a, b| u32::from(a != b)),
            Instruction::new("jz")
                .operand(U32)
                .consumes(VALUE_STACK, U32)
                .mutates_ip()
                .callback(|ops| {
                    let target = ops.code_at::<u32>(0)?;
                    if ops.stack_at::<u32>(0)? == 0 {
                        Ok(Outcome::jump(target as usize))
                    } else {
                        Ok(Outcome::none())
                    }
                }),
            Instruction::new("jump")
                .operand(U32)
                .mutates_ip()
                .callback(|ops| Ok(Outcome::jump(ops.code_at::<u32>(0)? as usize))),
            binary("add", u32::wrapping_add),
            binary("sub", u32::wrapping_sub),
            binary("mul", u32::wrapping_mul),
            Instruction::new("swap")
                .consumes(VALUE_STACK, U32)
                .consumes(VALUE_STACK, U32)
                .produces(VALUE_STACK, U32)
                .produces(VALUE_STACK, U32)
                .callback(|ops| {
                    let (a, b) = (ops.stack_at::<u32>(0)?, ops.stack_at::<u32>(1)?);
                    Ok(Outcome::values([Value::from(b), Value::from(a)]))
                }),
            Instruction::new("rotln")
                .iterable(U32, VALUE_STACK, U32)
                .produces_each(VALUE_STACK, U32)
                .callback(rotate_left),
        ])
        .build()
}

/// `a b -> f(a, b)`.
fn binary(name: &str, f: fn(u32, u32) -> u32) -> Instruction {
    Instruction::new(name)
        .consumes(VALUE_STACK, U32)
        .consumes(VALUE_STACK, U32)
        .produces(VALUE_STACK, U32)
        .callback(move |ops| Ok(Outcome::push(f(ops.stack_at(0)?, ops.stack_at(1)?))))
}

fn read(console: Arc<dyn Console>) -> Instruction {
    Instruction::new("read")
        .produces(VALUE_STACK, U32)
        .callback(move |_| {
            let line = console.read_line()?;
            let value = line
                .trim()
                .parse::<u32>()
                .map_err(|_| VMError::callback(format!("'{}' is not a u32", line.trim())))?;
            Ok(Outcome::push(value))
        })
}

fn write(console: Arc<dyn Console>) -> Instruction {
    Instruction::new("write")
        .consumes(VALUE_STACK, U32)
        .callback(move |ops| {
            console.write_line(&ops.stack_at::<u32>(0)?.to_string())?;
            Ok(Outcome::none())
        })
}

/// Pushes the popped items back rotated left by one: the former top ends up
/// on top again, below it the rest in reverse.
pub(crate) fn rotate_left(ops: &Operands) -> Result<Outcome, VMError> {
    let mut items = ops.list_at::<u32>(0)?;
    if !items.is_empty() {
        items.rotate_left(1);
    }
    let list: Vec<Value> = items.into_iter().map(Value::from).collect();
    Ok(Outcome::values([Operand::List(list)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction_sets::ScriptedConsole;
    use crate::virtual_machine::status::Status;
    use crate::virtual_machine::value::FromValue;
    use crate::virtual_machine::vm::Vm;

    fn vm_with(input: &[&str]) -> (Vm, Arc<ScriptedConsole>) {
        let console = Arc::new(ScriptedConsole::new(input.iter().copied()));
        let table = table(console.clone()).unwrap();
        (Vm::new(Arc::new(table)), console)
    }

    fn run(vm: &mut Vm, source: &str) -> Status {
        let program = vm.assemble(source).into_output().unwrap();
        vm.interpret(&program).status()
    }

    fn stack(vm: &Vm) -> Vec<u32> {
        vm.stack(VALUE_STACK)
            .unwrap()
            .into_iter()
            .map(|v| u32::from_value(v).unwrap())
            .collect()
    }

    #[test]
    fn opcodes_in_table_order() {
        let table = table(Arc::new(ScriptedConsole::default())).unwrap();
        let names: Vec<&str> = table.iter().map(|i| i.name()).collect();
        assert_eq!(
            names,
            [
                "push", "pop", "read", "write", "dup", "eq", "jz", "jump", "add", "sub", "mul",
                "swap", "rotln"
            ]
        );
    }

    #[test]
    fn add_and_write() {
        let (mut vm, console) = vm_with(&[]);
        assert_eq!(run(&mut vm, "push 1\npush 4\nadd\nwrite"), Status::Success);
        assert_eq!(console.output(), vec!["5"]);
        assert!(stack(&vm).is_empty());
    }

    #[test]
    fn arithmetic_wraps() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(
            run(&mut vm, "push 2\npush 5\nsub\npush 4294967295\npush 2\nmul"),
            Status::Success
        );
        assert_eq!(stack(&vm), vec![u32::MAX - 2, u32::MAX - 1]);
    }

    #[test]
    fn sub_takes_top_as_right_operand() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(run(&mut vm, "push 10\npush 3\nsub"), Status::Success);
        assert_eq!(stack(&vm), vec![7]);
    }

    #[test]
    fn eq_and_swap() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(
            run(&mut vm, "push 3\npush 3\neq\npush 1\npush 2\neq\npush 8\npush 9\nswap"),
            Status::Success
        );
        assert_eq!(stack(&vm), vec![0, 1, 9, 8]);
    }

    #[test]
    fn rotln_rotates_top_items() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(
            run(&mut vm, "push 1\npush 2\npush 3\npush 4\nrotln 3"),
            Status::Success
        );
        // popped 4 3 2, rotated to 3 2 4
        assert_eq!(stack(&vm), vec![1, 3, 2, 4]);
    }

    #[test]
    fn rotln_zero_is_noop() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(run(&mut vm, "push 1\nrotln 0"), Status::Success);
        assert_eq!(stack(&vm), vec![1]);
    }

    #[test]
    fn countdown_loop() {
        // 0: read          1
        // 1: dup           1
        // 2: write         1
        // 3: push 1        5
        // 8: sub           1
        // 9: dup           1
        // 10: jz 20        5
        // 15: jump 1       5
        let (mut vm, console) = vm_with(&["3"]);
        let source = "read\ndup\nwrite\npush 1\nsub\ndup\njz 20\njump 1";
        assert_eq!(run(&mut vm, source), Status::Success);
        assert_eq!(console.output(), vec!["3", "2", "1"]);
        assert_eq!(stack(&vm), vec![0]);
    }

    #[test]
    fn read_rejects_garbage() {
        let (mut vm, _) = vm_with(&["nope"]);
        assert_eq!(run(&mut vm, "read"), Status::InternalError);
    }

    #[test]
    fn read_without_input_fails() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(run(&mut vm, "read"), Status::InternalError);
    }

    #[test]
    fn pop_discards() {
        let (mut vm, _) = vm_with(&[]);
        assert_eq!(run(&mut vm, "push 1\npush 2\npop"), Status::Success);
        assert_eq!(stack(&vm), vec![1]);
        assert_eq!(run(&mut vm, "pop\npop"), Status::PopEmptyStack);
    }
}
