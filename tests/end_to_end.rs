use stackvm::instruction_sets::mixed::FLOAT_STACK;
use stackvm::instruction_sets::{InstructionSet, ScriptedConsole, mini};
use stackvm::virtual_machine::codec::{BytecodeCodec, NumericCodec, Representation};
use stackvm::virtual_machine::errors::VMError;
use stackvm::virtual_machine::isa::InstructionTable;
use stackvm::virtual_machine::program::Program;
use stackvm::virtual_machine::stack::{StackId, TaggedStack, VALUE_STACK, ValueStack};
use stackvm::virtual_machine::status::Status;
use stackvm::virtual_machine::value::{Value, ValueType};
use stackvm::virtual_machine::vm::Vm;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

// read n, print n!
//  0 read
//  1 push 1
//  6 swap
//  7 dup          <- loop
//  8 jz 32
// 13 dup
// 14 rotln 3
// 19 mul
// 20 swap
// 21 push 1
// 26 sub
// 27 jump 7
// 32 pop          <- end
// 33 write
const FACTORIAL: &str = "\
read
push 1
swap
dup
jz 32
dup
rotln 3
mul
swap
push 1
sub
jump 7
pop
write
";

fn mini_vm(input: &[&str]) -> (Vm, Arc<ScriptedConsole>) {
    let console = Arc::new(ScriptedConsole::new(input.iter().copied()));
    let table = mini::table(console.clone()).unwrap();
    (Vm::new(Arc::new(table)), console)
}

#[test]
fn factorial() {
    for (n, expected) in [("0", "1"), ("1", "1"), ("5", "120"), ("10", "3628800")] {
        let (mut vm, console) = mini_vm(&[n]);
        let program = vm.assemble(FACTORIAL).into_output().unwrap();
        assert_eq!(program.len(), 34);

        let pass = vm.interpret(&program);
        assert_eq!(pass.status(), Status::Success, "{:?}", pass.error());
        assert_eq!(console.output(), vec![expected]);
        assert!(vm.stack(VALUE_STACK).unwrap().is_empty());
    }
}

#[test]
fn disassembly_round_trips_through_files() {
    let (vm, _) = mini_vm(&[]);
    let program = vm.assemble(FACTORIAL).into_output().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("factorial.bin");
    program.save(&path).unwrap();
    let loaded = Program::load(&path).unwrap();

    assert_eq!(vm.disassemble(&loaded).into_output().unwrap(), FACTORIAL);
}

#[test]
fn status_of_each_pass() {
    let (mut vm, _) = mini_vm(&[]);
    assert_eq!(vm.assemble("push").status(), Status::BadInstructionOperand);
    assert_eq!(vm.assemble("nope").status(), Status::BadInstructionName);
    assert_eq!(vm.assemble("\n").status(), Status::NoInstructionName);
    assert_eq!(
        vm.disassemble(&Program::from_bytes(vec![0xee])).status(),
        Status::InvalidInstructionOpcode
    );
    assert_eq!(
        vm.interpret(&Program::from_bytes(vec![0x0, 0x1])).status(),
        Status::CodeOverflow
    );
    assert_eq!(
        vm.interpret(&Program::from_bytes(vec![0x3])).status(),
        Status::PopEmptyStack
    );
}

#[test]
fn mixed_set_routes_by_stack() {
    let console = Arc::new(ScriptedConsole::default());
    let table = InstructionSet::Mixed.table(console.clone()).unwrap();
    let mut vm = Vm::new(Arc::new(table));

    let program = vm
        .assemble("push 1\npush 4\nadd\nwrite\nfpush 2.0\nfpush 3.0\nfadd\nfwrite\n")
        .into_output()
        .unwrap();
    assert!(vm.interpret(&program).is_success());
    assert_eq!(console.output(), vec!["5", "5.0"]);
    assert!(vm.stack(FLOAT_STACK).unwrap().is_empty());
}

/// Accepts `_` digit separators on top of the numeric codec.
struct SeparatorCodec;

impl BytecodeCodec for SeparatorCodec {
    fn parse(&self, ty: ValueType, text: &str) -> Result<Value, VMError> {
        NumericCodec.parse(ty, &text.replace('_', ""))
    }

    fn encode(&self, value: Value, repr: Representation) -> Result<Vec<u8>, VMError> {
        NumericCodec.encode(value, repr)
    }

    fn decode(&self, ty: ValueType, repr: Representation, bytes: &[u8]) -> Result<Value, VMError> {
        NumericCodec.decode(ty, repr, bytes)
    }
}

#[test]
fn custom_codec() {
    let console = Arc::new(ScriptedConsole::default());
    let table = Arc::new(mini::table(console.clone()).unwrap());
    let mut vm = Vm::with_codec(table, SeparatorCodec);

    let program = vm.assemble("push 1_000_000\nwrite").into_output().unwrap();
    assert!(vm.interpret(&program).is_success());
    assert_eq!(console.output(), vec!["1000000"]);
    assert_eq!(
        vm.disassemble(&program).into_output().unwrap(),
        "push 1000000\nwrite\n"
    );
}

/// Tagged stack that counts pushes.
struct CountingStack {
    inner: TaggedStack,
    pushes: Arc<AtomicUsize>,
}

impl ValueStack for CountingStack {
    fn push(&mut self, value: Value) -> Result<(), VMError> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        self.inner.push(value)
    }

    fn pop(&mut self, ty: ValueType) -> Result<Value, VMError> {
        self.inner.pop(ty)
    }

    fn peek(&self) -> Option<Value> {
        self.inner.peek()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) {
        self.inner.clear()
    }

    fn snapshot(&self) -> Vec<Value> {
        self.inner.snapshot()
    }
}

#[test]
fn custom_stack_storage() {
    let (mut vm, _) = mini_vm(&[]);
    let pushes = Arc::new(AtomicUsize::new(0));
    vm.replace_stack(
        VALUE_STACK,
        Box::new(CountingStack {
            inner: TaggedStack::new(VALUE_STACK, [ValueType::U32]),
            pushes: pushes.clone(),
        }),
    );

    let program = vm.assemble("push 2\ndup\nmul").into_output().unwrap();
    assert!(vm.interpret(&program).is_success());
    assert_eq!(vm.stack(VALUE_STACK).unwrap(), vec![Value::U32(4)]);
    // push, two from dup, one from mul
    assert_eq!(pushes.load(Ordering::Relaxed), 4);
}

#[test]
fn table_is_shared_between_threads() {
    let console = Arc::new(ScriptedConsole::default());
    let table: Arc<InstructionTable> = Arc::new(mini::table(console.clone()).unwrap());

    let handles: Vec<_> = (1..=4u32)
        .map(|n| {
            let table = table.clone();
            thread::spawn(move || {
                let mut vm = Vm::new(table);
                let source = format!("push {n}\npush {n}\nmul");
                let program = vm.assemble(&source).into_output().unwrap();
                assert!(vm.interpret(&program).is_success());
                vm.stack(VALUE_STACK).unwrap()
            })
        })
        .collect();

    for (n, handle) in (1..=4u32).zip(handles) {
        assert_eq!(handle.join().unwrap(), vec![Value::U32(n * n)]);
    }
    assert!(console.output().is_empty());
}

#[test]
fn unknown_stack_is_not_created() {
    let (vm, _) = mini_vm(&[]);
    assert!(vm.stack(StackId(7)).is_none());
}
