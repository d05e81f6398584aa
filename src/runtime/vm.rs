//! The stack-based virtual machine.
//!
//! Execution is cooperative: `exec()` runs a bounded number of
//! instructions and then yields back to the host. The call stack
//! interleaves script frames with in-flight host calls; a child frame's
//! result becomes the parent's next stack top when the parent resumes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::compiler::opcode::Opcode;
use crate::compiler::reader::CodeReader;
use crate::compiler::unit::CompilationUnit;
use crate::error::RuntimeError;

use super::env::Environment;
use super::function::{CallResult, Function, HostCall};
use super::value::{Enumerator, Value};

/// What `exec()` reports back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The instruction quota was consumed; call `exec()` again to
    /// continue.
    Exhausted,
    /// The call stack is empty; the program terminated.
    Done,
    /// The top frame is a host call that has not completed yet.
    Paused,
}

/// One entry on the call stack: either a script frame or a host call.
pub enum Frame {
    Script(ExecutionContext),
    Host(Box<dyn HostCall>),
}

/// What a single instruction asked the machine to do.
enum Effect {
    /// Keep running this frame.
    Normal,
    /// Pop this frame and hand the value to the caller.
    Return(Value),
    /// Push a new frame; this frame resumes when it returns.
    Call(Frame),
}

/// Per-frame state of a script function or the top-level program.
pub struct ExecutionContext {
    reader: CodeReader,
    pub data_stack: Vec<Value>,
    pub locals: Vec<Value>,
    /// Binds this frame to a non-default environment; used when a
    /// function owned by another environment is called through an
    /// object handle.
    pub override_env: Option<Rc<RefCell<Environment>>>,
}

impl ExecutionContext {
    pub fn new(unit: Rc<CompilationUnit>, offset: usize, locals: Vec<Value>) -> Self {
        Self {
            reader: CodeReader::new(unit, offset),
            data_stack: Vec::new(),
            locals,
            override_env: None,
        }
    }

    fn push(&mut self, value: Value) {
        self.data_stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.data_stack.pop().ok_or(RuntimeError::StackEmpty)
    }

    /// Execute a single instruction.
    fn step(
        &mut self,
        env: &Rc<RefCell<Environment>>,
        trace: bool,
    ) -> Result<Effect, RuntimeError> {
        if trace {
            let mut line = format!("{:06X}", self.reader.offset);
            for value in &self.data_stack {
                line.push('\t');
                line.push_str(&value.to_string());
            }
            eprintln!("{}", line);
        }

        let op = self.reader.fetch_instruction()?;
        match op {
            Opcode::Nop => {}

            Opcode::PushNum => {
                let value = self.reader.fetch_number()?;
                self.push(Value::Number(value));
            }
            Opcode::PushStr => {
                let value = self.reader.fetch_string()?;
                self.push(Value::String(value));
            }
            Opcode::PushTrue => self.push(Value::Boolean(true)),
            Opcode::PushFalse => self.push(Value::Boolean(false)),
            Opcode::PushVoid => self.push(Value::Void),

            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::StoreLocal => {
                let index = self.reader.fetch_u16()? as usize;
                let value = self.pop()?;
                match self.locals.get_mut(index) {
                    Some(slot) => *slot = value,
                    None => return Err(RuntimeError::InvalidVariable),
                }
            }
            Opcode::LoadLocal => {
                let index = self.reader.fetch_u16()? as usize;
                let value = self
                    .locals
                    .get(index)
                    .cloned()
                    .ok_or(RuntimeError::InvalidVariable)?;
                self.push(value);
            }

            Opcode::StoreGlobalIdx => {
                let index = self.reader.fetch_u16()?;
                let value = self.pop()?;
                env.borrow_mut().set_global(index, value)?;
            }
            Opcode::LoadGlobalIdx => {
                let index = self.reader.fetch_u16()?;
                let value = env.borrow().global(index)?;
                self.push(value);
            }

            Opcode::StoreGlobalName => {
                let name = self.reader.fetch_string()?;
                let value = self.pop()?;
                env.borrow_mut().store_named(&name, value)?;
            }
            Opcode::LoadGlobalName => {
                let name = self.reader.fetch_string()?;
                let value = env.borrow().load_named(&name)?;
                self.push(value);
            }

            Opcode::Ret => return Ok(Effect::Return(Value::Void)),
            Opcode::RetVal => {
                let value = self.pop()?;
                return Ok(Effect::Return(value));
            }

            Opcode::Jmp => {
                let target = self.reader.fetch_u32()?;
                self.reader.jump(target)?;
            }
            Opcode::Jif => {
                let target = self.reader.fetch_u32()?;
                if !self.pop()?.as_boolean()? {
                    self.reader.jump(target)?;
                }
            }
            Opcode::Jnf => {
                let target = self.reader.fetch_u32()?;
                if self.pop()?.as_boolean()? {
                    self.reader.jump(target)?;
                }
            }

            Opcode::Add => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.push(lhs.add(rhs)?);
            }
            Opcode::Sub => self.binary_number(|a, b| a - b)?,
            Opcode::Mul => self.binary_number(|a, b| a * b)?,
            Opcode::Div => self.binary_number(|a, b| a / b)?,
            Opcode::Mod => self.binary_number(|a, b| a % b)?,

            Opcode::And => self.binary_boolean(|a, b| a && b)?,
            Opcode::Or => self.binary_boolean(|a, b| a || b)?,
            Opcode::Not => {
                let value = self.pop()?.as_boolean()?;
                self.push(Value::Boolean(!value));
            }
            Opcode::Negate => {
                let value = self.pop()?.as_number()?;
                self.push(Value::Number(-value));
            }

            Opcode::Eq => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let equal = lhs.equals(&rhs)?;
                self.push(Value::Boolean(equal));
            }
            Opcode::Neq => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let equal = lhs.equals(&rhs)?;
                self.push(Value::Boolean(!equal));
            }
            Opcode::LessEq => self.binary_compare(|a, b| a <= b)?,
            Opcode::GreaterEq => self.binary_compare(|a, b| a >= b)?,
            Opcode::Less => self.binary_compare(|a, b| a < b)?,
            Opcode::Greater => self.binary_compare(|a, b| a > b)?,

            Opcode::ArrayPack => {
                let count = self.reader.fetch_u16()? as usize;
                let mut array = Vec::with_capacity(count);
                for _ in 0..count {
                    array.push(self.pop()?);
                }
                self.push(Value::Array(array));
            }
            Opcode::ArrayLoad => {
                let array = self.pop()?.into_array()?;
                let index = array_index(&self.pop()?, array.len())?;
                self.push(array[index].clone());
            }
            Opcode::ArrayStore => {
                let mut array = self.pop()?.into_array()?;
                let index_value = self.pop()?;
                let value = self.pop()?;
                let index = array_index(&index_value, array.len())?;
                array[index] = value;
                self.push(Value::Array(array));
            }

            Opcode::IterMake => {
                let array = self.pop()?.into_array()?;
                self.push(Value::Enumerator(Box::new(Enumerator::new(array))));
            }
            Opcode::IterNext => {
                // The enumerator stays on the stack for the whole loop;
                // the loop epilogue pops it.
                let item = match self.data_stack.last_mut() {
                    Some(Value::Enumerator(iter)) => iter.next(),
                    Some(_) => return Err(RuntimeError::TypeMismatch),
                    None => return Err(RuntimeError::StackEmpty),
                };
                match item {
                    Some(value) => {
                        self.push(value);
                        self.push(Value::Boolean(true));
                    }
                    None => self.push(Value::Boolean(false)),
                }
            }

            Opcode::CallFn => {
                let name = self.reader.fetch_string()?;
                let argc = self.reader.fetch_u8()? as usize;
                let function = env
                    .borrow()
                    .get_function(&name)
                    .ok_or_else(|| RuntimeError::UnsupportedFunction(name.clone()))?;

                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.pop()?);
                }
                return self.dispatch_call(function.as_ref(), &args);
            }
            Opcode::CallObj => {
                let name = self.reader.fetch_string()?;
                let argc = self.reader.fetch_u8()? as usize;

                let object = self.pop()?.into_object()?;
                let target = object.lock().ok_or(RuntimeError::ObjectDisposed)?;

                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.pop()?);
                }

                let function = target
                    .get_function(&name)
                    .ok_or_else(|| RuntimeError::UnsupportedFunction(name.clone()))?;
                return self.dispatch_call(function.as_ref(), &args);
            }
        }

        Ok(Effect::Normal)
    }

    fn dispatch_call(
        &mut self,
        function: &dyn Function,
        args: &[Value],
    ) -> Result<Effect, RuntimeError> {
        match function.call(args)? {
            CallResult::Immediate(value) => {
                self.push(value);
                Ok(Effect::Normal)
            }
            CallResult::Host(call) => Ok(Effect::Call(Frame::Host(call))),
            CallResult::Script(context) => Ok(Effect::Call(Frame::Script(context))),
        }
    }

    fn binary_number(&mut self, op: impl FnOnce(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let rhs = self.pop()?.as_number()?;
        let lhs = self.pop()?.as_number()?;
        self.push(Value::Number(op(lhs, rhs)));
        Ok(())
    }

    fn binary_boolean(&mut self, op: impl FnOnce(bool, bool) -> bool) -> Result<(), RuntimeError> {
        let rhs = self.pop()?.as_boolean()?;
        let lhs = self.pop()?.as_boolean()?;
        self.push(Value::Boolean(op(lhs, rhs)));
        Ok(())
    }

    fn binary_compare(&mut self, op: impl FnOnce(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let rhs = self.pop()?.as_number()?;
        let lhs = self.pop()?.as_number()?;
        self.push(Value::Boolean(op(lhs, rhs)));
        Ok(())
    }
}

/// Convert a value to an array index. Indexing with anything but a
/// number is a type mismatch; a negative, fractional or out-of-range
/// index is an out-of-range access.
fn array_index(value: &Value, len: usize) -> Result<usize, RuntimeError> {
    let number = value.as_number()?;
    if number < 0.0 || number.fract() != 0.0 {
        return Err(RuntimeError::InvalidPointer);
    }
    let index = number as usize;
    if index >= len {
        return Err(RuntimeError::InvalidPointer);
    }
    Ok(index)
}

/// Internal per-cycle outcome of the machine.
enum Step {
    Ran,
    Done,
    Paused,
}

/// The virtual machine drives one environment's code in bounded steps.
/// It is not re-entrant: one thread drives `exec()` at a time.
pub struct VirtualMachine {
    env: Rc<RefCell<Environment>>,
    frames: Vec<Frame>,
    /// Print one line per instruction (hex offset plus data stack) to
    /// stderr.
    pub enable_trace: bool,
    /// Maximum instructions per `exec()` call.
    pub instruction_quota: usize,
}

impl VirtualMachine {
    pub fn new(env: Rc<RefCell<Environment>>) -> Self {
        Self::with_entry_point(env, 0)
    }

    /// Start execution at a specific byte offset of the unit's code.
    pub fn with_entry_point(env: Rc<RefCell<Environment>>, entry_point: usize) -> Self {
        let unit = env.borrow().unit();
        // The top-level frame's locals are the temporary slots; the
        // indexed globals live in the environment.
        let locals = vec![Value::Void; unit.temporary_count as usize];
        let context = ExecutionContext::new(unit, entry_point, locals);

        Self {
            env,
            frames: vec![Frame::Script(context)],
            enable_trace: false,
            instruction_quota: 1000,
        }
    }

    /// Whether the program has terminated.
    pub fn finished(&self) -> bool {
        self.frames.is_empty()
    }

    /// Run up to `instruction_quota` instructions. Stops early when the
    /// program terminates (`Done`) or when the top frame is a host call
    /// that is still in flight (`Paused`). A runtime error unwinds the
    /// whole call stack; the machine is unusable afterwards.
    pub fn exec(&mut self) -> Result<ExecutionResult, RuntimeError> {
        for _ in 0..self.instruction_quota {
            match self.step() {
                Ok(Step::Ran) => {}
                Ok(Step::Done) => return Ok(ExecutionResult::Done),
                Ok(Step::Paused) => return Ok(ExecutionResult::Paused),
                Err(err) => {
                    self.frames.clear();
                    return Err(err);
                }
            }
        }
        Ok(ExecutionResult::Exhausted)
    }

    fn step(&mut self) -> Result<Step, RuntimeError> {
        if self.frames.is_empty() {
            return Ok(Step::Done);
        }

        enum Outcome {
            Ran,
            Paused,
            Push(Frame),
            Return(Value),
        }

        let trace = self.enable_trace;
        let default_env = self.env.clone();

        let outcome = match self.frames.last_mut().expect("frame stack is non-empty") {
            Frame::Host(call) => match call.execute()? {
                Some(value) => Outcome::Return(value),
                None => Outcome::Paused,
            },
            Frame::Script(context) => {
                let env = context.override_env.clone().unwrap_or(default_env);
                match context.step(&env, trace)? {
                    Effect::Normal => Outcome::Ran,
                    Effect::Call(frame) => Outcome::Push(frame),
                    Effect::Return(value) => Outcome::Return(value),
                }
            }
        };

        match outcome {
            Outcome::Ran => Ok(Step::Ran),
            Outcome::Paused => Ok(Step::Paused),
            Outcome::Push(frame) => {
                self.frames.push(frame);
                Ok(Step::Ran)
            }
            Outcome::Return(value) => {
                self.frames.pop();
                if self.return_to_caller(value)? {
                    Ok(Step::Ran)
                } else {
                    Ok(Step::Done)
                }
            }
        }
    }

    /// Hand a returned value to the new top of the stack. Returns
    /// `false` when there is no caller left. The last frame must return
    /// Void.
    fn return_to_caller(&mut self, value: Value) -> Result<bool, RuntimeError> {
        match self.frames.last_mut() {
            Some(Frame::Script(parent)) => {
                parent.push(value);
                Ok(true)
            }
            Some(Frame::Host(call)) => {
                call.resume(value)?;
                Ok(true)
            }
            None => {
                if matches!(value, Value::Void) {
                    Ok(false)
                } else {
                    Err(RuntimeError::InvalidTopLevelReturn)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::runtime::env::{environment_object, GlobalBinding};
    use crate::runtime::function::NativeFunction;
    use crate::runtime::object::{ObjectRef, ScriptObject};

    fn compile_source(source: &str) -> Rc<CompilationUnit> {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut diagnostics = Diagnostics::new();
        crate::compiler::compile(&program, &mut diagnostics)
            .unwrap_or_else(|| panic!("diagnostics: {}", diagnostics))
    }

    /// Build an environment with a `Print` capturing output lines.
    fn test_env(unit: Rc<CompilationUnit>) -> (Rc<RefCell<Environment>>, Rc<RefCell<Vec<String>>>) {
        let env = Environment::new(unit);
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = output.clone();
        env.borrow_mut().register(
            "Print",
            Rc::new(NativeFunction::new("Print", move |args| {
                let line = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.borrow_mut().push(line);
                Ok(Value::Void)
            })),
        );
        (env, output)
    }

    fn run_to_completion(vm: &mut VirtualMachine) -> Result<(), RuntimeError> {
        loop {
            match vm.exec()? {
                ExecutionResult::Done => return Ok(()),
                ExecutionResult::Exhausted | ExecutionResult::Paused => continue,
            }
        }
    }

    fn run(source: &str) -> Vec<String> {
        let (env, output) = test_env(compile_source(source));
        let mut vm = VirtualMachine::new(env);
        run_to_completion(&mut vm).unwrap();
        assert!(vm.finished());
        let lines = output.borrow().clone();
        lines
    }

    fn run_err(source: &str) -> RuntimeError {
        let (env, _output) = test_env(compile_source(source));
        let mut vm = VirtualMachine::new(env);
        run_to_completion(&mut vm).unwrap_err()
    }

    // --- End-to-end scenarios ---

    #[test]
    fn arithmetic_and_variables() {
        let output = run("var a = 10; var b = 20; Print(a + b); Print(a * b - 5);");
        assert_eq!(output, vec!["30", "195"]);
    }

    #[test]
    fn recursive_function() {
        let output = run(
            "function Fib(n) { if (n <= 1) { return 1; } return Fib(n-1) + Fib(n-2); } \
             Print(Fib(6));",
        );
        assert_eq!(output, vec!["13"]);
    }

    #[test]
    fn iteration_over_array_literal() {
        let output = run("var xs = [\"a\",\"b\",\"c\"]; for (x in xs) { Print(x); }");
        assert_eq!(output, vec!["a", "b", "c"]);
    }

    #[test]
    fn array_mutation_and_concatenation() {
        let output = run(
            "var xs = [\"This\",\"is\",\"a\"]; xs = xs + [\"Sentence\"]; xs[1] = \"was\"; \
             Print(xs[0]); Print(xs[1]); Print(xs[3]);",
        );
        assert_eq!(output, vec!["This", "was", "Sentence"]);
    }

    struct Counter {
        value: Rc<RefCell<f64>>,
    }

    impl ScriptObject for Counter {
        fn get_function(&self, name: &str) -> Option<Rc<dyn Function>> {
            match name {
                "Increment" => {
                    let value = self.value.clone();
                    Some(Rc::new(NativeFunction::new("Increment", move |_| {
                        let mut v = value.borrow_mut();
                        *v += 1.0;
                        Ok(Value::Number(*v))
                    })))
                }
                "Decrement" => {
                    let value = self.value.clone();
                    Some(Rc::new(NativeFunction::new("Decrement", move |_| {
                        let mut v = value.borrow_mut();
                        *v -= 1.0;
                        Ok(Value::Number(*v))
                    })))
                }
                "GetValue" => {
                    let value = self.value.clone();
                    Some(Rc::new(NativeFunction::new("GetValue", move |_| {
                        Ok(Value::Number(*value.borrow()))
                    })))
                }
                _ => None,
            }
        }
    }

    fn register_counter_factory(env: &Rc<RefCell<Environment>>) {
        env.borrow_mut().register(
            "CreateCounter",
            Rc::new(NativeFunction::new("CreateCounter", |_| {
                Ok(Value::Object(ObjectRef::new(Rc::new(Counter {
                    value: Rc::new(RefCell::new(0.0)),
                }))))
            })),
        );
    }

    #[test]
    fn host_object_method_chain() {
        let (env, output) = test_env(compile_source(
            "var c = CreateCounter(); Print(c.Increment()); Print(c.Increment()); \
             Print(c.Decrement());",
        ));
        register_counter_factory(&env);
        let mut vm = VirtualMachine::new(env);
        run_to_completion(&mut vm).unwrap();
        assert_eq!(*output.borrow(), vec!["1", "2", "1"]);
    }

    #[test]
    fn extern_global_with_getter_only() {
        let (env, output) = test_env(compile_source("extern RO; Print(RO);"));
        env.borrow_mut()
            .register_global("RO", GlobalBinding::getter(|| Value::Number(42.0)));
        let mut vm = VirtualMachine::new(env);
        run_to_completion(&mut vm).unwrap();
        assert_eq!(*output.borrow(), vec!["42"]);
    }

    #[test]
    fn assigning_a_getter_only_global_fails() {
        let (env, _output) = test_env(compile_source("extern RO; RO = 1;"));
        env.borrow_mut()
            .register_global("RO", GlobalBinding::getter(|| Value::Number(42.0)));
        let mut vm = VirtualMachine::new(env);
        assert!(matches!(
            run_to_completion(&mut vm),
            Err(RuntimeError::ReadOnlyVariable(_))
        ));
    }

    // --- Language behavior ---

    #[test]
    fn arrays_have_value_semantics() {
        let output = run("var a = [1,2,3]; var b = a; a[0] = 99; Print(a[0]); Print(b[0]);");
        assert_eq!(output, vec!["99", "1"]);
    }

    #[test]
    fn iteration_snapshot_ignores_later_mutation() {
        let output = run("var xs = [1,2]; for (x in xs) { xs = xs + [9]; Print(x); }");
        assert_eq!(output, vec!["1", "2"]);
    }

    #[test]
    fn globals_are_shared_with_functions() {
        let output = run("var g; function Set(x) { g = x; } Set(42); Print(g);");
        assert_eq!(output, vec!["42"]);
    }

    #[test]
    fn top_level_temporaries_work() {
        let output = run("{ var t = 5; { var u = t + 1; Print(u); } }");
        assert_eq!(output, vec!["6"]);
    }

    #[test]
    fn while_with_break_and_continue() {
        let output = run(
            "var n = 0; var total = 0; \
             while (true) { \
                 n = n + 1; \
                 if (n == 3) { continue; } \
                 if (n > 5) { break; } \
                 total = total + n; \
             } \
             Print(total);",
        );
        // 1 + 2 + 4 + 5
        assert_eq!(output, vec!["12"]);
    }

    #[test]
    fn modulo_and_comparisons() {
        let output = run("Print(7 % 3); Print(1 < 2); Print(not (1 < 2)); Print(-(3));");
        assert_eq!(output, vec!["1", "true", "false", "-3"]);
    }

    #[test]
    fn nested_array_store() {
        let output = run("var m = [[1,2],[3,4]]; m[1][0] = 9; Print(m[1][0]); Print(m[0][0]);");
        assert_eq!(output, vec!["9", "1"]);
    }

    #[test]
    fn empty_array_pack_and_identity_concat() {
        let output = run("var xs = []; xs = xs + [1]; xs = [] + xs; Print(xs[0]);");
        assert_eq!(output, vec!["1"]);
    }

    #[test]
    fn string_escapes_reach_the_runtime() {
        let output = run(r#"Print("a\tb");"#);
        assert_eq!(output, vec!["a\tb"]);
    }

    // --- Error behavior ---

    #[test]
    fn type_mismatch_in_arithmetic() {
        assert_eq!(run_err("var a = 1 - true;"), RuntimeError::TypeMismatch);
        assert_eq!(run_err("var a = true and 1;"), RuntimeError::TypeMismatch);
        assert_eq!(run_err("var a = not 1;"), RuntimeError::TypeMismatch);
        assert_eq!(run_err("if (1) { }"), RuntimeError::TypeMismatch);
    }

    #[test]
    fn add_on_unsupported_variant_is_invalid_operator() {
        assert_eq!(run_err("var a = true + false;"), RuntimeError::InvalidOperator);
        assert_eq!(run_err("var a = void + void;"), RuntimeError::InvalidOperator);
    }

    #[test]
    fn array_index_errors() {
        assert_eq!(run_err("var a = [1]; Print(a[2]);"), RuntimeError::InvalidPointer);
        assert_eq!(
            run_err("var a = [1]; Print(a[0.5]);"),
            RuntimeError::InvalidPointer
        );
        assert_eq!(
            run_err("var a = [1]; Print(a[\"x\"]);"),
            RuntimeError::TypeMismatch
        );
    }

    #[test]
    fn unknown_function_is_unsupported() {
        assert!(matches!(
            run_err("Missing();"),
            RuntimeError::UnsupportedFunction(name) if name == "Missing"
        ));
    }

    #[test]
    fn top_level_return_value_is_rejected() {
        assert_eq!(run_err("return 1;"), RuntimeError::InvalidTopLevelReturn);
        // A bare return at the top level just terminates the program.
        let output = run("Print(1); return; Print(2);");
        assert_eq!(output, vec!["1"]);
    }

    #[test]
    fn disposed_object_is_observable() {
        let object = ObjectRef::new(Rc::new(Counter {
            value: Rc::new(RefCell::new(0.0)),
        }));

        let (env, _output) = test_env(compile_source("var o = GetObject(); o.Increment();"));
        let handle = object.clone();
        env.borrow_mut().register(
            "GetObject",
            Rc::new(NativeFunction::new("GetObject", move |_| {
                Ok(Value::Object(handle.clone()))
            })),
        );

        object.dispose();

        let mut vm = VirtualMachine::new(env);
        assert_eq!(
            run_to_completion(&mut vm),
            Err(RuntimeError::ObjectDisposed)
        );
    }

    #[test]
    fn unknown_method_is_unsupported() {
        let (env, _output) = test_env(compile_source("var c = CreateCounter(); c.Missing();"));
        register_counter_factory(&env);
        let mut vm = VirtualMachine::new(env);
        assert!(matches!(
            run_to_completion(&mut vm),
            Err(RuntimeError::UnsupportedFunction(_))
        ));
    }

    #[test]
    fn method_call_on_non_object_is_type_mismatch() {
        assert_eq!(run_err("var x = 1; x.Foo();"), RuntimeError::TypeMismatch);
    }

    // --- Scheduling ---

    #[test]
    fn quota_of_one_always_exhausts_until_done() {
        let (env, output) = test_env(compile_source("Print(1); Print(2);"));
        let mut vm = VirtualMachine::new(env);
        vm.instruction_quota = 1;

        let mut exhausted = 0;
        loop {
            match vm.exec().unwrap() {
                ExecutionResult::Exhausted => exhausted += 1,
                ExecutionResult::Done => break,
                ExecutionResult::Paused => panic!("nothing pauses here"),
            }
        }
        assert!(exhausted > 0);
        assert_eq!(*output.borrow(), vec!["1", "2"]);
    }

    #[test]
    fn quota_bounds_each_exec_call() {
        let (env, _output) = test_env(compile_source("var n = 0; while (true) { n = n + 1; }"));
        let mut vm = VirtualMachine::new(env);
        vm.instruction_quota = 10;
        for _ in 0..5 {
            assert_eq!(vm.exec().unwrap(), ExecutionResult::Exhausted);
        }
        assert!(!vm.finished());
    }

    #[test]
    fn exec_after_done_stays_done() {
        let (env, _output) = test_env(compile_source("var a = 1;"));
        let mut vm = VirtualMachine::new(env);
        assert_eq!(vm.exec().unwrap(), ExecutionResult::Done);
        assert_eq!(vm.exec().unwrap(), ExecutionResult::Done);
    }

    struct DelayedCall {
        polls_left: usize,
        value: f64,
    }

    impl HostCall for DelayedCall {
        fn execute(&mut self) -> Result<Option<Value>, RuntimeError> {
            if self.polls_left > 0 {
                self.polls_left -= 1;
                Ok(None)
            } else {
                Ok(Some(Value::Number(self.value)))
            }
        }
    }

    struct DelayedFunction;

    impl Function for DelayedFunction {
        fn call(&self, _args: &[Value]) -> Result<CallResult, RuntimeError> {
            Ok(CallResult::Host(Box::new(DelayedCall {
                polls_left: 1,
                value: 7.0,
            })))
        }
    }

    #[test]
    fn host_call_pauses_and_resumes() {
        let (env, output) = test_env(compile_source("Print(Await());"));
        env.borrow_mut().register("Await", Rc::new(DelayedFunction));
        let mut vm = VirtualMachine::new(env);

        // The first exec parks on the in-flight host call.
        assert_eq!(vm.exec().unwrap(), ExecutionResult::Paused);
        // The next exec completes the call and the program.
        assert_eq!(vm.exec().unwrap(), ExecutionResult::Done);
        assert_eq!(*output.borrow(), vec!["7"]);
    }

    #[test]
    fn errors_unwind_the_call_stack() {
        let (env, _output) = test_env(compile_source(
            "function Boom() { var x = 1 + true; } Boom();",
        ));
        let mut vm = VirtualMachine::new(env);
        assert_eq!(
            run_to_completion(&mut vm),
            Err(RuntimeError::TypeMismatch)
        );
        assert!(vm.finished());
    }

    // --- Cross-environment calls ---

    #[test]
    fn environment_objects_bind_frames_to_their_environment() {
        let library = Environment::new(compile_source(
            "var seed = 40; function Magic() { return seed + 2; }",
        ));
        // Initialize the library's globals by running its top level.
        let mut setup = VirtualMachine::new(library.clone());
        run_to_completion(&mut setup).unwrap();

        let (env, output) = test_env(compile_source("var lib = GetLib(); Print(lib.Magic());"));
        let handle = environment_object(&library);
        env.borrow_mut().register(
            "GetLib",
            Rc::new(NativeFunction::new("GetLib", move |_| {
                Ok(Value::Object(handle.clone()))
            })),
        );

        let mut vm = VirtualMachine::new(env);
        run_to_completion(&mut vm).unwrap();
        assert_eq!(*output.borrow(), vec!["42"]);
    }

    // --- Hand-assembled units ---

    fn raw_vm(code: Vec<u8>, temporaries: u16) -> VirtualMachine {
        let unit = Rc::new(CompilationUnit {
            global_count: 0,
            temporary_count: temporaries,
            code,
            functions: Default::default(),
        });
        VirtualMachine::new(Environment::new(unit))
    }

    #[test]
    fn jump_to_code_length_is_invalid_pointer() {
        let mut code = vec![Opcode::Jmp as u8];
        code.extend_from_slice(&5u32.to_le_bytes());
        let mut vm = raw_vm(code, 0);
        assert_eq!(vm.exec(), Err(RuntimeError::InvalidPointer));
    }

    #[test]
    fn running_off_the_code_end_is_invalid_pointer() {
        let mut vm = raw_vm(vec![Opcode::Nop as u8], 0);
        assert_eq!(vm.exec(), Err(RuntimeError::InvalidPointer));
    }

    #[test]
    fn unknown_opcode_is_invalid_instruction() {
        let mut vm = raw_vm(vec![3], 0);
        assert_eq!(vm.exec(), Err(RuntimeError::InvalidInstruction));
    }

    #[test]
    fn pop_on_empty_stack_is_stack_empty() {
        let mut vm = raw_vm(vec![Opcode::Pop as u8], 0);
        assert_eq!(vm.exec(), Err(RuntimeError::StackEmpty));
    }

    #[test]
    fn jnf_jumps_on_true() {
        // push_true; jnf 7; push_void (skipped); ret @ 7
        let mut code = vec![Opcode::PushTrue as u8, Opcode::Jnf as u8];
        code.extend_from_slice(&7u32.to_le_bytes());
        code.push(Opcode::PushVoid as u8);
        code.push(Opcode::Ret as u8);
        let mut vm = raw_vm(code, 0);
        assert_eq!(vm.exec().unwrap(), ExecutionResult::Done);
    }

    #[test]
    fn store_local_out_of_range_is_invalid_variable() {
        let mut code = vec![Opcode::PushVoid as u8, Opcode::StoreLocal as u8];
        code.extend_from_slice(&9u16.to_le_bytes());
        let mut vm = raw_vm(code, 1);
        assert_eq!(vm.exec(), Err(RuntimeError::InvalidVariable));
    }
}
