use super::*;
use crate::instruction_sets::ScriptedConsole;
use crate::utils::test_utils::utils::{basic_table, basic_table_with, cross_width_float_table};
use crate::virtual_machine::assembler::assemble;
use crate::virtual_machine::codec::NumericCodec;
use crate::virtual_machine::isa::Outcome;
use crate::virtual_machine::stack::VALUE_STACK;
use crate::virtual_machine::status::{Status, ToStatus};
use std::sync::Arc;

fn interpret(table: &InstructionTable, chunk: &[u8]) -> (Status, StackSet) {
    let mut stacks = StackSet::tagged(table.stacks());
    let status = match Interpreter::new(table, &NumericCodec, &mut stacks).run(chunk) {
        Ok(()) => Status::Success,
        Err(err) => err.status(),
    };
    (status, stacks)
}

fn interpret_source(table: &InstructionTable, source: &str) -> (Status, StackSet) {
    let program = assemble(table, &NumericCodec, source).unwrap();
    interpret(table, program.as_bytes())
}

fn values(stacks: &StackSet) -> Vec<Value> {
    stacks.get(VALUE_STACK).unwrap().snapshot()
}

fn u32s(items: &[u32]) -> Vec<Value> {
    items.iter().copied().map(Value::U32).collect()
}

#[test]
fn empty_program_succeeds() {
    let (status, stacks) = interpret(&basic_table(), &[]);
    assert_eq!(status, Status::Success);
    assert!(values(&stacks).is_empty());
}

#[test]
fn truncated_operand_overflows() {
    let (status, _) = interpret(&basic_table(), &[0x1, 0x0]);
    assert_eq!(status, Status::CodeOverflow);
}

#[test]
fn undefined_opcode() {
    let (status, _) = interpret(&basic_table(), &[0x9, 0x0]);
    assert_eq!(status, Status::InvalidInstructionOpcode);
    let (status, _) = interpret(&basic_table(), &[0xff]);
    assert_eq!(status, Status::InvalidInstructionOpcode);
}

#[test]
fn pop_on_empty_stack() {
    let (status, _) = interpret(&basic_table(), &[0x2, 0x0]);
    assert_eq!(status, Status::PopEmptyStack);
}

#[test]
fn full_program() {
    // push 1, dup, zero, range 2, rotln 3 then jump past the end (22 bytes)
    let (status, stacks) = interpret_source(
        &basic_table(),
        "push 1\ndup\nzero\nrange 2\nrotln 3\njump 23",
    );
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[1, 1, 0, 0, 1]));
}

#[test]
fn jump_to_exact_end_stops() {
    // zero @0, jump @1, zero @6, end @7
    let (status, stacks) = interpret_source(&basic_table(), "zero\njump 7\nzero");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[0]));
}

#[test]
fn jump_skips_instructions() {
    // push 7 @0, jump 11 @5, zero @10, dup @11
    let (status, stacks) = interpret_source(&basic_table(), "push 7\njump 11\nzero\ndup");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[7, 7]));
}

#[test]
fn jump_into_operand_bytes() {
    // offset 1 decodes as another jump whose operand runs off the chunk
    let (status, _) = interpret(&basic_table(), &[0x1, 0x1, 0x0, 0x0, 0x0]);
    assert_eq!(status, Status::CodeOverflow);
}

#[test]
fn write_prints_sum() {
    let console = Arc::new(ScriptedConsole::default());
    let table = basic_table_with(console.clone());
    let (status, stacks) = interpret_source(&table, "push 1\npush 4\nadd\nwrite");
    assert_eq!(status, Status::Success);
    assert_eq!(console.output(), vec!["5"]);
    assert!(values(&stacks).is_empty());
}

#[test]
fn pop_pipe_discards() {
    let (status, stacks) = interpret_source(&basic_table(), "push 1\npush 2\npop");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[1]));
}

#[test]
fn iterable_needs_enough_elements() {
    let (status, _) = interpret_source(&basic_table(), "push 1\nrotln 3");
    assert_eq!(status, Status::PopEmptyStack);
}

#[test]
fn iterable_of_zero_elements() {
    let (status, stacks) = interpret_source(&basic_table(), "push 1\nrotln 0");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[1]));
}

#[test]
fn single_operand_beyond_its_range() {
    // widened: an f32 read from 8 bytes holding 1e300
    let mut chunk = vec![0x1];
    chunk.extend_from_slice(&1e300f64.to_le_bytes());
    let (status, stacks) = interpret(&cross_width_float_table(), &chunk);
    assert_eq!(status, Status::BadInstructionOperand);
    assert!(values(&stacks).is_empty());
}

#[test]
fn state_survives_up_to_failure() {
    let (status, stacks) = interpret(&basic_table(), &[0x0, 0x0, 0x9]);
    assert_eq!(status, Status::InvalidInstructionOpcode);
    assert_eq!(values(&stacks), u32s(&[0, 0]));
}

#[test]
fn consumers_bind_in_declaration_order() {
    let table = InstructionTable::builder()
        .instruction(
            Instruction::new("push")
                .operand(ValueType::U32)
                .produces(VALUE_STACK, ValueType::U32)
                .pipe(),
        )
        .instruction(
            Instruction::new("sub")
                .consumes(VALUE_STACK, ValueType::U32)
                .consumes(VALUE_STACK, ValueType::U32)
                .produces(VALUE_STACK, ValueType::U32)
                .callback(|ops| {
                    let (a, b) = (ops.stack_at::<u32>(0)?, ops.stack_at::<u32>(1)?);
                    Ok(Outcome::push(a.wrapping_sub(b)))
                }),
        )
        .build()
        .unwrap();

    let (status, stacks) = interpret_source(&table, "push 10\npush 3\nsub");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), u32s(&[7]));
}

#[test]
fn pipe_forwards_stack_then_code() {
    let table = InstructionTable::builder()
        .instruction(
            Instruction::new("push")
                .operand(ValueType::U32)
                .produces(VALUE_STACK, ValueType::U32)
                .pipe(),
        )
        .instruction(
            Instruction::new("tag")
                .consumes(VALUE_STACK, ValueType::U32)
                .operand(ValueType::U8)
                .produces(VALUE_STACK, ValueType::U32)
                .produces(VALUE_STACK, ValueType::U8)
                .pipe(),
        )
        .build()
        .unwrap();

    let (status, stacks) = interpret_source(&table, "push 5\ntag 9");
    assert_eq!(status, Status::Success);
    assert_eq!(values(&stacks), vec![Value::U32(5), Value::U8(9)]);
}

#[test]
fn type_mismatch_leaves_value_in_place() {
    let table = InstructionTable::builder()
        .instruction(
            Instruction::new("pushu")
                .operand(ValueType::U32)
                .produces(VALUE_STACK, ValueType::U32)
                .pipe(),
        )
        .instruction(
            Instruction::new("pushf")
                .operand(ValueType::F64)
                .produces(VALUE_STACK, ValueType::F64)
                .pipe(),
        )
        .instruction(
            Instruction::new("addu")
                .consumes(VALUE_STACK, ValueType::U32)
                .consumes(VALUE_STACK, ValueType::U32)
                .produces(VALUE_STACK, ValueType::U32)
                .callback(|ops| {
                    Ok(Outcome::push(ops.stack_at::<u32>(0)? + ops.stack_at::<u32>(1)?))
                }),
        )
        .build()
        .unwrap();

    let (status, stacks) = interpret_source(&table, "pushf 1.0\npushu 2\naddu");
    assert_eq!(status, Status::InternalError);
    // the u32 on top was taken, the f64 below it was not
    assert_eq!(values(&stacks), vec![Value::F64(1.0)]);
}

fn faulty_table() -> InstructionTable {
    InstructionTable::builder()
        .instruction(
            Instruction::new("zero")
                .produces(VALUE_STACK, ValueType::U32)
                .callback(|_| Ok(Outcome::push(0u32))),
        )
        .instruction(
            Instruction::new("sneaky")
                .callback(|_| Ok(Outcome::jump(0))),
        )
        .instruction(
            Instruction::new("silent")
                .produces(VALUE_STACK, ValueType::U32)
                .callback(|_| Ok(Outcome::none())),
        )
        .instruction(
            Instruction::new("liar")
                .produces(VALUE_STACK, ValueType::U32)
                .callback(|_| Ok(Outcome::push(1.5f64))),
        )
        .instruction(
            Instruction::new("fail")
                .callback(|_| Err(VMError::callback("refused"))),
        )
        .build()
        .unwrap()
}

#[test]
fn jump_from_non_jumping_instruction() {
    let (status, _) = interpret(&faulty_table(), &[0x1]);
    assert_eq!(status, Status::InternalError);
}

#[test]
fn productions_must_match_declaration() {
    let table = faulty_table();

    let (status, stacks) = interpret(&table, &[0x0, 0x2]);
    assert_eq!(status, Status::InternalError);
    assert_eq!(values(&stacks), u32s(&[0]));

    let (status, stacks) = interpret(&table, &[0x0, 0x3]);
    assert_eq!(status, Status::InternalError);
    assert_eq!(values(&stacks), u32s(&[0]));
}

#[test]
fn callback_errors_propagate() {
    let table = faulty_table();
    let mut stacks = StackSet::tagged(table.stacks());
    let err = Interpreter::new(&table, &NumericCodec, &mut stacks)
        .run(&[0x4])
        .unwrap_err();
    assert!(matches!(err, VMError::Callback { .. }));
    assert_eq!(err.status(), Status::InternalError);
}
