//! Integer and floating point values on separate stacks.
//!
//! `u32` values live on [`VALUE_STACK`], `f64` values on [`FLOAT_STACK`].
//! `tofloat` and `toint` move a value across; `toint` truncates toward zero and
//! saturates.

use crate::instruction_sets::Console;
use crate::virtual_machine::codec::Endianness;
use crate::virtual_machine::errors::ConfigError;
use crate::virtual_machine::isa::{Instruction, InstructionTable, Outcome};
use crate::virtual_machine::stack::{StackId, VALUE_STACK};
use crate::virtual_machine::value::{FromValue, Value, ValueType};
use std::sync::Arc;

pub const FLOAT_STACK: StackId = StackId(1);

pub fn table(console: Arc<dyn Console>) -> Result<InstructionTable, ConfigError> {
    use ValueType::{F64, U32};

    InstructionTable::builder()
        .endianness(Endianness::Little)
        .instructions([
            Instruction::new("push")
                .operand(U32)
                .produces(VALUE_STACK, U32)
                .pipe(),
            Instruction::new("fpush")
                .operand(F64)
                .produces(FLOAT_STACK, F64)
                .pipe(),
            Instruction::new("add")
                .consumes(VALUE_STACK, U32)
                .consumes(VALUE_STACK, U32)
                .produces(VALUE_STACK, U32)
                .callback(|ops| {
                    let (a, b) = (ops.stack_at::<u32>(0)?, ops.stack_at::<u32>(1)?);
                    Ok(Outcome::push(a.wrapping_add(b)))
                }),
            Instruction::new("fadd")
                .consumes(FLOAT_STACK, F64)
                .consumes(FLOAT_STACK, F64)
                .produces(FLOAT_STACK, F64)
                .callback(|ops| Ok(Outcome::push(ops.stack_at::<f64>(0)? + ops.stack_at::<f64>(1)?))),
            write::<u32>("write", VALUE_STACK, console.clone()),
            write::<f64>("fwrite", FLOAT_STACK, console),
            Instruction::new("tofloat")
                .consumes(VALUE_STACK, U32)
                .produces(FLOAT_STACK, F64)
                .callback(|ops| Ok(Outcome::push(f64::from(ops.stack_at::<u32>(0)?)))),
            Instruction::new("toint")
                .consumes(FLOAT_STACK, F64)
                .produces(VALUE_STACK, U32)
                .callback(|ops| Ok(Outcome::push(ops.stack_at::<f64>(0)? as u32))),
        ])
        .build()
}

fn write<T>(name: &str, stack: StackId, console: Arc<dyn Console>) -> Instruction
where
    T: FromValue + Into<Value>,
{
    Instruction::new(name)
        .consumes(stack, T::TYPE)
        .callback(move |ops| {
            let value: Value = ops.stack_at::<T>(0)?.into();
            console.write_line(&value.to_string())?;
            Ok(Outcome::none())
        })
}
