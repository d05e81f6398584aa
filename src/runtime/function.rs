//! Callables: host functions, asynchronous host calls and the split
//! between immediate results and scheduled frames.

use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;

use super::value::Value;
use super::vm::ExecutionContext;

/// What invoking a callable produced.
///
/// Fast intrinsics return `Immediate` and avoid a frame push entirely.
/// Anything that needs to run over multiple VM cycles (a host call that
/// waits for outside work, or a script function) becomes a new frame.
pub enum CallResult {
    /// A synchronous result; pushed straight onto the caller's stack.
    Immediate(Value),
    /// A host call the machine schedules as a frame and polls.
    Host(Box<dyn HostCall>),
    /// A script frame, ready to execute.
    Script(ExecutionContext),
}

/// A callable registered with an environment or exposed by an object.
pub trait Function {
    fn call(&self, args: &[Value]) -> Result<CallResult, RuntimeError>;
}

/// An in-flight host call sitting on the VM's call stack.
pub trait HostCall {
    /// Polled once per VM cycle. Returning `Some` completes the call;
    /// the value is handed to the caller. Returning `None` keeps the
    /// machine paused until the host finishes the work.
    fn execute(&mut self) -> Result<Option<Value>, RuntimeError>;

    /// Invoked when a child frame pushed on top of this call returns.
    /// The default implementation discards the result.
    fn resume(&mut self, result: Value) -> Result<(), RuntimeError> {
        let _ = result;
        Ok(())
    }
}

/// A synchronous host function backed by a closure.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    func: Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }
}

impl Function for NativeFunction {
    fn call(&self, args: &[Value]) -> Result<CallResult, RuntimeError> {
        Ok(CallResult::Immediate((self.func)(args)?))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_functions_return_immediates() {
        let double = NativeFunction::new("Double", |args| {
            Ok(Value::Number(args[0].as_number()? * 2.0))
        });
        match double.call(&[Value::Number(21.0)]).unwrap() {
            CallResult::Immediate(value) => assert_eq!(value.as_number(), Ok(42.0)),
            _ => panic!("expected immediate result"),
        }
    }

    #[test]
    fn native_function_errors_propagate() {
        let fail = NativeFunction::new("Fail", |_| Err(RuntimeError::TypeMismatch));
        assert!(matches!(
            fail.call(&[]),
            Err(RuntimeError::TypeMismatch)
        ));
    }
}
